//! Prediction service: request validation, preprocessing, inference,
//! and score denormalization.

use crate::error::PredictionError;
use crate::feature_extractor::{FeatureExtractor, FeatureMap};
use crate::models::context::ModelContext;
use crate::models::encoder::{OnnxEncoder, VisualEncoder};
use crate::preprocess::ImagePreprocessor;
use crate::types::PredictionResponse;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Raw inbound call: encoded image plus the serialized feature payload.
///
/// Either part may be absent; absence is reported as a bad request.
#[derive(Debug, Clone, Default)]
pub struct PredictionRequest {
    pub image: Option<Vec<u8>>,
    pub features: Option<String>,
}

/// Turns one image and one feature map into a score in original units.
///
/// Holds only read-only state, so one instance serves any number of
/// concurrent callers.
pub struct PredictionService<E = OnnxEncoder> {
    context: Arc<ModelContext<E>>,
    preprocessor: ImagePreprocessor,
    extractor: FeatureExtractor,
}

impl<E: VisualEncoder> PredictionService<E> {
    pub fn new(context: Arc<ModelContext<E>>) -> Self {
        Self {
            context,
            preprocessor: ImagePreprocessor::new(),
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn context(&self) -> &ModelContext<E> {
        &self.context
    }

    /// Predict the viability score for one tile.
    pub fn predict(
        &self,
        image: Option<&[u8]>,
        features: Option<&FeatureMap>,
    ) -> Result<f64, PredictionError> {
        let image = image.ok_or_else(|| PredictionError::BadRequest("missing image".to_string()))?;
        let features =
            features.ok_or_else(|| PredictionError::BadRequest("missing features".to_string()))?;

        let start = Instant::now();
        let image_tensor = self.preprocessor.preprocess(image)?;
        let preprocess_time = start.elapsed();

        let raw_features = self.extractor.extract(features)?;
        let scaled = self.context.feature_scaler().transform(&raw_features);

        let start = Instant::now();
        let raw_score = self.context.model().forward(&image_tensor, &scaled)?;
        let inference_time = start.elapsed();

        let score = self.context.score_scaler().inverse_transform(raw_score as f64);

        debug!(
            preprocess_us = preprocess_time.as_micros() as u64,
            inference_us = inference_time.as_micros() as u64,
            raw_score = raw_score,
            score = score,
            "Prediction complete"
        );

        Ok(score)
    }

    /// Handle a raw inbound call, parsing the feature payload first.
    pub fn handle(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictionError> {
        if request.image.is_none() || request.features.is_none() {
            return Err(PredictionError::BadRequest(
                "provide both image and features".to_string(),
            ));
        }

        let features = request
            .features
            .as_deref()
            .map(FeatureMap::from_json)
            .transpose()?;

        let predicted_score = self.predict(request.image.as_deref(), features.as_ref())?;
        Ok(PredictionResponse { predicted_score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::TabularFeature;
    use crate::test_support::{png_bytes, sample_features, test_service};
    use std::thread;

    #[test]
    fn test_end_to_end_scenario_gives_finite_score() {
        let service = test_service();
        let score = service
            .predict(Some(png_bytes(1, 1).as_slice()), Some(&sample_features()))
            .unwrap();
        assert!(score.is_finite());

        let score = service
            .predict(Some(png_bytes(513, 257).as_slice()), Some(&sample_features()))
            .unwrap();
        assert!(score.is_finite());
    }

    #[test]
    fn test_predict_is_bit_identical_across_calls() {
        let service = test_service();
        let image = png_bytes(300, 200);
        let features = sample_features();

        let first = service.predict(Some(image.as_slice()), Some(&features)).unwrap();
        for _ in 0..5 {
            let again = service.predict(Some(image.as_slice()), Some(&features)).unwrap();
            assert_eq!(first.to_bits(), again.to_bits());
        }
    }

    #[test]
    fn test_concurrent_callers_agree() {
        let service = Arc::new(test_service());
        let image = Arc::new(png_bytes(128, 96));
        let expected = service
            .predict(Some(image.as_slice()), Some(&sample_features()))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                let image = image.clone();
                thread::spawn(move || {
                    service
                        .predict(Some(image.as_slice()), Some(&sample_features()))
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn test_score_is_denormalized() {
        let service = test_service();
        let image = png_bytes(64, 64);
        let features = sample_features();

        let image_tensor = ImagePreprocessor::new().preprocess(&image).unwrap();
        let scaled = service
            .context()
            .feature_scaler()
            .transform(&FeatureExtractor::new().extract(&features).unwrap());
        let raw = service.context().model().forward(&image_tensor, &scaled).unwrap();

        let score = service.predict(Some(image.as_slice()), Some(&features)).unwrap();
        let scaler = service.context().score_scaler();
        assert_eq!(score, raw as f64 * scaler.scale() + scaler.mean());
    }

    #[test]
    fn test_missing_inputs_are_bad_requests() {
        let service = test_service();
        let image = png_bytes(8, 8);

        assert!(matches!(
            service.predict(None, Some(&sample_features())),
            Err(PredictionError::BadRequest(_))
        ));
        assert!(matches!(
            service.predict(Some(image.as_slice()), None),
            Err(PredictionError::BadRequest(_))
        ));
    }

    #[test]
    fn test_each_missing_feature_is_reported() {
        let service = test_service();
        let image = png_bytes(8, 8);

        for omitted in TabularFeature::ALL {
            let features: FeatureMap = TabularFeature::ALL
                .iter()
                .filter(|f| **f != omitted)
                .map(|f| (f.name(), 1.0))
                .collect();

            match service.predict(Some(image.as_slice()), Some(&features)) {
                Err(PredictionError::MissingFeature(name)) => assert_eq!(name, omitted.name()),
                other => panic!("expected missing {}, got {:?}", omitted, other),
            }
        }
    }

    #[test]
    fn test_extra_features_are_ignored() {
        let service = test_service();
        let image = png_bytes(40, 40);
        let mut extended = sample_features();
        extended.insert("population", 12000.0);

        let base = service.predict(Some(image.as_slice()), Some(&sample_features())).unwrap();
        let with_extra = service.predict(Some(image.as_slice()), Some(&extended)).unwrap();
        assert_eq!(base.to_bits(), with_extra.to_bits());
    }

    #[test]
    fn test_corrupt_image_is_decode_error() {
        let service = test_service();
        let result = service.predict(Some(&b"GIF89a-truncated"[..]), Some(&sample_features()));
        assert!(matches!(result, Err(PredictionError::Decode(_))));
    }

    #[test]
    fn test_handle_parses_payload() {
        let service = test_service();
        let request = PredictionRequest {
            image: Some(png_bytes(32, 32)),
            features: Some(
                r#"{"slope":3.2,"nighttime_light":2.1,"mean_ndvi":0.45,"mean_distance_to_water":300.0,"land_cover_class":10,"elevation":1500}"#
                    .to_string(),
            ),
        };

        let response = service.handle(&request).unwrap();
        let direct = service
            .predict(request.image.as_deref(), Some(&sample_features()))
            .unwrap();
        assert_eq!(response.predicted_score.to_bits(), direct.to_bits());
    }

    #[test]
    fn test_handle_rejects_missing_or_malformed_fields() {
        let service = test_service();

        let no_image = PredictionRequest {
            image: None,
            features: Some("{}".to_string()),
        };
        assert!(matches!(service.handle(&no_image), Err(PredictionError::BadRequest(_))));

        let bad_json = PredictionRequest {
            image: Some(png_bytes(4, 4)),
            features: Some("elevation=1500".to_string()),
        };
        assert!(matches!(service.handle(&bad_json), Err(PredictionError::BadRequest(_))));

        assert!(matches!(
            service.handle(&PredictionRequest::default()),
            Err(PredictionError::BadRequest(_))
        ));
    }
}
