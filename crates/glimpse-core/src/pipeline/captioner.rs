//! Pipeline orchestration: bytes in, caption out.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use ndarray::{Array1, ArrayView1};

use crate::caption::assemble;
use crate::config::{Config, LimitsConfig, ModelConfig};
use crate::decoder::{Decoder, DecoderDims};
use crate::encoder::{preprocess, preprocess_batch, Encoder};
use crate::error::{CaptionError, CaptionResult, ModelError, ModelResult, Result};
use crate::scope::InferenceScope;
use crate::types::{Caption, CaptionedImage};
use crate::vocabulary::Vocabulary;

use super::decode::{format_to_string, ImageDecoder};

/// Everything needed to caption an image, loaded once and shared read-only.
///
/// Wrap it in an `Arc` to serve concurrent requests; no method takes
/// `&mut self` and no request data is stored on it.
pub struct Captioner {
    vocabulary: Vocabulary,
    encoder: Encoder,
    decoder: Decoder,
    image_decoder: ImageDecoder,
    max_caption_len: usize,
    next_request: AtomicU64,
}

impl Captioner {
    /// Load every artifact named in `config` and check they agree.
    pub fn load(config: &Config) -> ModelResult<Self> {
        let paths = config.artifact_paths();
        let model = &config.model;

        let vocabulary = Vocabulary::load(&paths.vocabulary)?;
        let encoder = Encoder::load(&paths.encoder_backbone, &paths.encoder_head, model.embed_size)?;
        let decoder = Decoder::load(
            &paths.decoder,
            DecoderDims {
                vocab_size: vocabulary.len(),
                embed_size: model.embed_size,
                hidden_size: model.hidden_size,
                num_layers: model.num_layers,
            },
        )?;

        Self::new(vocabulary, encoder, decoder, model, config.limits.clone())
    }

    /// Assemble a captioner from loaded parts.
    ///
    /// Fails if the vocabulary, encoder, decoder and `model` disagree on any
    /// dimension.
    pub fn new(
        vocabulary: Vocabulary,
        encoder: Encoder,
        decoder: Decoder,
        model: &ModelConfig,
        limits: LimitsConfig,
    ) -> ModelResult<Self> {
        let dims = decoder.dims();
        let checks = [
            ("vocabulary size", vocabulary.len(), dims.vocab_size),
            ("encoder embed_size", model.embed_size, encoder.embed_size()),
            ("decoder embed_size", model.embed_size, dims.embed_size),
            ("decoder hidden_size", model.hidden_size, dims.hidden_size),
            ("decoder num_layers", model.num_layers, dims.num_layers),
        ];
        for (name, expected, actual) in checks {
            if expected != actual {
                return Err(ModelError::ShapeMismatch {
                    name: name.to_string(),
                    expected: vec![expected],
                    actual: vec![actual],
                });
            }
        }

        Ok(Self {
            vocabulary,
            encoder,
            decoder,
            image_decoder: ImageDecoder::new(limits),
            max_caption_len: model.max_caption_len,
            next_request: AtomicU64::new(1),
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn max_caption_len(&self) -> usize {
        self.max_caption_len
    }

    fn request_id(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Decode uploaded bytes and caption the image.
    pub fn caption_bytes(&self, bytes: &[u8]) -> CaptionResult<Caption> {
        let decoded = self.image_decoder.decode(bytes)?;
        self.caption_image(&decoded.image)
    }

    /// Caption an already decoded image.
    pub fn caption_image(&self, image: &DynamicImage) -> CaptionResult<Caption> {
        let batch = preprocess(image);
        InferenceScope::run(self.request_id(), |scope| {
            let embeddings = self.encoder.encode(scope, &batch)?;
            let caption = self.caption_embedding(scope, embeddings.row(0))?;
            tracing::debug!(
                "Captioned image in {:?}: {:?}",
                scope.elapsed(),
                caption.text
            );
            Ok(caption)
        })
    }

    /// Caption several images with one encoder pass.
    ///
    /// Decoding still runs per image; results are in input order.
    pub fn caption_images(&self, images: &[DynamicImage]) -> CaptionResult<Vec<Caption>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let batch = preprocess_batch(images);
        InferenceScope::run(self.request_id(), |scope| {
            let embeddings = self.encoder.encode(scope, &batch)?;
            embeddings
                .rows()
                .into_iter()
                .map(|row| self.caption_embedding(scope, row))
                .collect()
        })
    }

    /// Image embedding without decoding.
    pub fn embed(&self, image: &DynamicImage) -> CaptionResult<Array1<f32>> {
        let batch = preprocess(image);
        InferenceScope::run(self.request_id(), |scope| {
            let embeddings = self.encoder.encode(scope, &batch)?;
            Ok(embeddings.row(0).to_owned())
        })
    }

    /// Caption a file on disk, keeping its image properties.
    pub fn caption_file(&self, path: &Path) -> Result<CaptionedImage> {
        let start = Instant::now();
        tracing::debug!("Captioning: {:?}", path);

        let bytes = std::fs::read(path)?;
        let decoded = self.image_decoder.decode(&bytes)?;
        let caption = self.caption_image(&decoded.image)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(CaptionedImage {
            file_path: path.to_path_buf(),
            file_name,
            width: decoded.width,
            height: decoded.height,
            format: format_to_string(decoded.format).to_string(),
            file_size: decoded.file_size,
            caption: caption.text,
            token_ids: caption.token_ids,
            termination: caption.termination,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// [`Captioner::caption_bytes`] on the blocking thread pool.
    pub async fn caption_bytes_async(self: Arc<Self>, bytes: Vec<u8>) -> CaptionResult<Caption> {
        tokio::task::spawn_blocking(move || self.caption_bytes(&bytes))
            .await
            .map_err(|e| CaptionError::inference("runtime", format!("Task join error: {e}")))?
    }

    fn caption_embedding(
        &self,
        scope: &InferenceScope,
        embedding: ArrayView1<f32>,
    ) -> CaptionResult<Caption> {
        let generation = self
            .decoder
            .generate(scope, embedding, self.max_caption_len)?;
        let text = assemble(&generation.token_ids, &self.vocabulary)?;
        Ok(Caption {
            text,
            token_ids: generation.token_ids,
            termination: generation.termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Termination;
    use crate::testing::{
        color_captioner, seeded_decoder, seeded_head, solid_png, tiny_captioner,
        tiny_model_config, tiny_vocabulary, ChannelStatsBackbone, FailingBackbone,
    };
    use crate::vocabulary::{END_ID, RESERVED_TOKENS};
    use image::RgbImage;

    const COLORS: [[u8; 3]; 6] = [
        [255, 0, 0],
        [0, 255, 0],
        [0, 0, 255],
        [240, 240, 240],
        [10, 10, 10],
        [128, 64, 200],
    ];

    fn solid(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb(rgb)))
    }

    fn dims_for(vocab_size: usize) -> DecoderDims {
        let model = tiny_model_config();
        DecoderDims {
            vocab_size,
            embed_size: model.embed_size,
            hidden_size: model.hidden_size,
            num_layers: model.num_layers,
        }
    }

    fn encoder(seed: u64) -> Encoder {
        Encoder::new(
            Box::new(ChannelStatsBackbone),
            seeded_head(tiny_model_config().embed_size, ChannelStatsBackbone::WIDTH, seed),
        )
        .unwrap()
    }

    #[test]
    fn test_caption_bytes_is_bounded_and_clean() {
        let seeded = tiny_captioner(3);
        let colored = color_captioner(LimitsConfig::default());
        let mut ended = 0;
        for captioner in [&seeded, &colored] {
            for rgb in COLORS {
                let bytes = solid_png(40, 30, rgb).unwrap();
                let caption = captioner.caption_bytes(&bytes).unwrap();

                assert!(caption.token_ids.len() <= captioner.max_caption_len());
                match caption.termination {
                    Termination::EndToken => {
                        assert_eq!(caption.token_ids.last(), Some(&END_ID));
                        ended += 1;
                    }
                    Termination::StepBudget => {
                        assert_eq!(caption.token_ids.len(), captioner.max_caption_len());
                        assert!(!caption.token_ids.contains(&END_ID));
                    }
                }
                for marker in RESERVED_TOKENS {
                    assert!(!caption.text.contains(marker));
                }
                assert!(!caption.text.contains("  "));
                assert_eq!(caption.text.trim(), caption.text);
            }
        }
        assert!(ended >= COLORS.len());
    }

    #[test]
    fn test_color_captions_stop_on_end_token() {
        let captioner = color_captioner(LimitsConfig::default());
        let vocab = captioner.vocabulary();
        let cases = [
            ([255, 0, 0], "dog runs", vec!["dog", "runs"]),
            ([0, 0, 255], "cat sits", vec!["cat", "sits"]),
            ([0, 255, 0], "", vec![]),
        ];

        for (rgb, text, words) in cases {
            let caption = captioner
                .caption_bytes(&solid_png(24, 24, rgb).unwrap())
                .unwrap();
            let mut expected: Vec<u32> = words.iter().map(|w| vocab.token_to_id(w)).collect();
            expected.push(END_ID);

            assert_eq!(caption.text, text);
            assert_eq!(caption.token_ids, expected);
            assert_eq!(caption.termination, Termination::EndToken);
        }
    }

    #[test]
    fn test_caption_is_deterministic() {
        let captioner = tiny_captioner(8);
        let bytes = solid_png(16, 16, [12, 200, 90]).unwrap();
        assert_eq!(
            captioner.caption_bytes(&bytes).unwrap(),
            captioner.caption_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn test_caption_bytes_rejects_garbage() {
        let captioner = tiny_captioner(1);
        assert!(matches!(
            captioner.caption_bytes(b"not an image"),
            Err(CaptionError::ImageDecode { .. })
        ));
        assert!(matches!(
            captioner.caption_bytes(&[]),
            Err(CaptionError::ImageDecode { .. })
        ));
    }

    #[test]
    fn test_one_by_one_image_is_captioned() {
        let captioner = tiny_captioner(2);
        let bytes = solid_png(1, 1, [90, 90, 90]).unwrap();
        assert!(captioner.caption_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_backbone_failure_is_per_request() {
        let vocabulary = tiny_vocabulary();
        let decoder = seeded_decoder(dims_for(vocabulary.len()), 4);
        let encoder = Encoder::new(
            Box::new(FailingBackbone::after_probe()),
            seeded_head(tiny_model_config().embed_size, ChannelStatsBackbone::WIDTH, 4),
        )
        .unwrap();
        let captioner = Captioner::new(
            vocabulary,
            encoder,
            decoder,
            &tiny_model_config(),
            LimitsConfig::default(),
        )
        .unwrap();

        let bytes = solid_png(8, 8, [1, 2, 3]).unwrap();
        let err = captioner.caption_bytes(&bytes).unwrap_err();
        assert!(matches!(err, CaptionError::Inference { ref stage, .. } if stage == "encode"));
    }

    #[test]
    fn test_new_rejects_vocabulary_mismatch() {
        let vocabulary = tiny_vocabulary();
        let decoder = seeded_decoder(dims_for(vocabulary.len() + 1), 4);
        let err = Captioner::new(
            vocabulary,
            encoder(4),
            decoder,
            &tiny_model_config(),
            LimitsConfig::default(),
        )
        .err();
        assert!(matches!(
            err,
            Some(ModelError::ShapeMismatch { ref name, .. }) if name == "vocabulary size"
        ));
    }

    #[test]
    fn test_new_rejects_config_mismatch() {
        let vocabulary = tiny_vocabulary();
        let decoder = seeded_decoder(dims_for(vocabulary.len()), 4);
        let model = ModelConfig {
            hidden_size: 32,
            ..tiny_model_config()
        };
        let err = Captioner::new(vocabulary, encoder(4), decoder, &model, LimitsConfig::default())
            .err();
        assert!(matches!(err, Some(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_distinct_images_have_distinct_embeddings() {
        let captioner = tiny_captioner(5);
        let red = captioner.embed(&solid([255, 0, 0])).unwrap();
        let blue = captioner.embed(&solid([0, 0, 255])).unwrap();
        assert_eq!(red.len(), tiny_model_config().embed_size);
        assert_ne!(red, blue);
    }

    #[test]
    fn test_caption_images_keeps_order() {
        let captioner = tiny_captioner(6);
        let images: Vec<DynamicImage> = COLORS.iter().map(|&rgb| solid(rgb)).collect();
        let captions = captioner.caption_images(&images).unwrap();
        assert_eq!(captions.len(), images.len());
        assert!(captioner.caption_images(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_requests_match_serial_results() {
        let captioner = Arc::new(color_captioner(LimitsConfig::default()));
        let colors = [[255, 0, 0], [0, 0, 255], [0, 255, 0]];
        let serial: Vec<Caption> = colors
            .iter()
            .map(|&rgb| captioner.caption_image(&solid(rgb)).unwrap())
            .collect();
        for (i, a) in serial.iter().enumerate() {
            for b in &serial[i + 1..] {
                assert_ne!(a.text, b.text);
            }
        }

        let handles: Vec<_> = colors
            .iter()
            .cycle()
            .take(colors.len() * 8)
            .enumerate()
            .map(|(i, &rgb)| {
                let captioner = Arc::clone(&captioner);
                std::thread::spawn(move || (i, captioner.caption_image(&solid(rgb)).unwrap()))
            })
            .collect();

        for handle in handles {
            let (i, caption) = handle.join().unwrap();
            assert_eq!(caption, serial[i % colors.len()]);
        }
    }

    #[tokio::test]
    async fn test_caption_bytes_async() {
        let captioner = Arc::new(tiny_captioner(9));
        let bytes = solid_png(20, 20, [200, 100, 0]).unwrap();
        let expected = captioner.caption_bytes(&bytes).unwrap();
        let caption = Arc::clone(&captioner)
            .caption_bytes_async(bytes)
            .await
            .unwrap();
        assert_eq!(caption, expected);
    }

    #[test]
    fn test_caption_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swatch.png");
        std::fs::write(&path, solid_png(12, 10, [5, 150, 5]).unwrap()).unwrap();

        let record = tiny_captioner(10).caption_file(&path).unwrap();
        assert_eq!(record.file_name, "swatch.png");
        assert_eq!((record.width, record.height), (12, 10));
        assert_eq!(record.format, "png");
        assert!(record.token_ids.len() <= 20);
    }

    #[test]
    fn test_load_reports_missing_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.model_dir = dir.path().to_path_buf();
        let err = Captioner::load(&config).err();
        assert!(matches!(err, Some(ModelError::MissingArtifact { .. })));
    }
}
