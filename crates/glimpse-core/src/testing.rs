//! Synthetic models for tests and benches.
//!
//! Nothing here touches ONNX Runtime or the filesystem model directory, so a
//! full [`Captioner`] can be built in memory.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{ImageFormat, RgbImage};
use ndarray::{s, Array1, Array2, Array4, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{LimitsConfig, ModelConfig};
use crate::decoder::{Decoder, DecoderDims, Lstm, LstmLayer};
use crate::encoder::{Backbone, Encoder, ProjectionHead};
use crate::error::{CaptionError, CaptionResult};
use crate::pipeline::Captioner;
use crate::vocabulary::{Vocabulary, END_ID};

pub use crate::weights::write_params;

/// Backbone whose features are each channel's mean and mean square.
///
/// Deterministic and cheap, and distinct colors give distinct features.
pub struct ChannelStatsBackbone;

impl ChannelStatsBackbone {
    pub const WIDTH: usize = 6;
}

impl Backbone for ChannelStatsBackbone {
    fn features(&self, batch: &Array4<f32>) -> CaptionResult<Array2<f32>> {
        let n = batch.shape()[0];
        let mut out = Array2::zeros((n, Self::WIDTH));
        for (i, image) in batch.axis_iter(Axis(0)).enumerate() {
            for (c, channel) in image.axis_iter(Axis(0)).enumerate() {
                let count = channel.len().max(1) as f32;
                out[[i, c]] = channel.sum() / count;
                out[[i, c + 3]] = channel.mapv(|v| v * v).sum() / count;
            }
        }
        Ok(out)
    }
}

/// Backbone that errors, either on every call or after the load-time probe.
pub struct FailingBackbone {
    healthy_calls: usize,
    calls: AtomicUsize,
}

impl FailingBackbone {
    pub fn always() -> Self {
        Self {
            healthy_calls: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Passes the probe in [`Encoder::new`], fails every request after.
    pub fn after_probe() -> Self {
        Self {
            healthy_calls: 1,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Backbone for FailingBackbone {
    fn features(&self, batch: &Array4<f32>) -> CaptionResult<Array2<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.healthy_calls {
            return ChannelStatsBackbone.features(batch);
        }
        Err(CaptionError::Inference {
            stage: "encode".to_string(),
            message: "synthetic backbone failure".to_string(),
        })
    }
}

fn uniform(rng: &mut StdRng, shape: (usize, usize)) -> Array2<f32> {
    Array2::from_shape_fn(shape, |_| rng.gen_range(-0.5..0.5))
}

/// Projection head with reproducible weights and a positive bias.
pub fn seeded_head(embed_size: usize, in_features: usize, seed: u64) -> ProjectionHead {
    let mut rng = StdRng::seed_from_u64(seed);
    let weight = uniform(&mut rng, (embed_size, in_features));
    let bias = Array1::from_shape_fn(embed_size, |_| rng.gen_range(0.0..0.5));
    ProjectionHead::new(weight, bias).expect("seeded head shapes agree")
}

fn build_decoder(
    dims: DecoderDims,
    mut fill: impl FnMut((usize, usize)) -> Array2<f32>,
    bias: Array1<f32>,
) -> Decoder {
    let gates = 4 * dims.hidden_size;
    let layers = (0..dims.num_layers)
        .map(|k| {
            let input = if k == 0 {
                dims.embed_size
            } else {
                dims.hidden_size
            };
            LstmLayer::new(
                fill((gates, input)),
                fill((gates, dims.hidden_size)),
                fill((gates, 1)).column(0).to_owned(),
                Array1::zeros(gates),
            )
            .expect("synthetic layer shapes agree")
        })
        .collect();
    let lstm = Lstm::new(layers).expect("synthetic stack is consistent");
    let embed = fill((dims.vocab_size, dims.embed_size));
    let linear_weight = fill((dims.vocab_size, dims.hidden_size));
    Decoder::new(embed, lstm, linear_weight, bias).expect("synthetic decoder shapes agree")
}

/// Decoder with reproducible random parameters.
pub fn seeded_decoder(dims: DecoderDims, seed: u64) -> Decoder {
    let mut rng = StdRng::seed_from_u64(seed);
    let bias = Array1::from_shape_fn(dims.vocab_size, |_| rng.gen_range(-0.5..0.5));
    build_decoder(dims, |shape| uniform(&mut rng, shape), bias)
}

/// Decoder whose logits equal `bias` at every step, whatever the input.
pub fn decoder_with_bias(dims: DecoderDims, bias: Array1<f32>) -> Decoder {
    build_decoder(dims, Array2::zeros, bias)
}

/// Write `decoder` to a safetensors file that [`Decoder::load`] accepts.
pub fn write_decoder_params(path: &Path, decoder: &Decoder) -> std::io::Result<()> {
    write_params(path, &decoder.named_tensors())
}

/// A small vocabulary over a handful of everyday scene words.
pub fn tiny_vocabulary() -> Vocabulary {
    Vocabulary::build(
        [
            "A dog runs on the grass.",
            "A cat sits on a red sofa.",
            "Two children play in the park.",
            "A man rides a bike down the street.",
        ],
        1,
    )
}

/// Model settings matching [`tiny_captioner`].
pub fn tiny_model_config() -> ModelConfig {
    ModelConfig {
        embed_size: 8,
        hidden_size: 16,
        num_layers: 2,
        max_caption_len: 20,
        ..ModelConfig::default()
    }
}

/// A complete in-memory captioner with seeded weights.
pub fn tiny_captioner(seed: u64) -> Captioner {
    let vocabulary = tiny_vocabulary();
    let model = tiny_model_config();
    let encoder = Encoder::new(
        Box::new(ChannelStatsBackbone),
        seeded_head(model.embed_size, ChannelStatsBackbone::WIDTH, seed),
    )
    .expect("synthetic encoder is consistent");
    let decoder = seeded_decoder(
        DecoderDims {
            vocab_size: vocabulary.len(),
            embed_size: model.embed_size,
            hidden_size: model.hidden_size,
            num_layers: model.num_layers,
        },
        seed.wrapping_add(1),
    );
    Captioner::new(vocabulary, encoder, decoder, &model, LimitsConfig::default())
        .expect("synthetic captioner is consistent")
}

/// Gate pre-activation that pins a sigmoid to 0 or 1.
const SATURATE: f32 = 20.0;

/// Embedding lane fed by the red channel mean.
const RED_LANE: usize = 0;

/// Embedding lane fed by the blue channel mean.
const BLUE_LANE: usize = 1;

/// A captioner with hand-set weights whose caption follows the image color.
///
/// Red images read "dog runs" and blue images read "cat sits". An image whose
/// red and blue means both sit below the ImageNet mean (green, near-black)
/// decodes END on the first step and reads "". Every caption ends on END.
///
/// Both LSTM layers copy their input lanes into the cell and forget the
/// previous step, so the next word depends only on the current input: the
/// image embedding first, then the embedding of the word just emitted.
pub fn color_captioner(limits: LimitsConfig) -> Captioner {
    let vocabulary = tiny_vocabulary();
    let model = tiny_model_config();
    let (embed_size, hidden) = (model.embed_size, model.hidden_size);

    let mut head_weight = Array2::<f32>::zeros((embed_size, ChannelStatsBackbone::WIDTH));
    head_weight[[RED_LANE, 0]] = 1.0;
    head_weight[[BLUE_LANE, 2]] = 1.0;
    let head = ProjectionHead::new(head_weight, Array1::<f32>::zeros(embed_size))
        .expect("color head shapes agree");
    let encoder =
        Encoder::new(Box::new(ChannelStatsBackbone), head).expect("color encoder is consistent");

    let layers = (0..model.num_layers)
        .map(|k| {
            let input = if k == 0 { embed_size } else { hidden };
            let mut w_ih = Array2::<f32>::zeros((4 * hidden, input));
            for lane in 0..embed_size {
                w_ih[[2 * hidden + lane, lane]] = 1.0;
            }
            let mut bias = Array1::<f32>::zeros(4 * hidden);
            bias.slice_mut(s![0..hidden]).fill(SATURATE);
            bias.slice_mut(s![hidden..2 * hidden]).fill(-SATURATE);
            bias.slice_mut(s![3 * hidden..]).fill(SATURATE);
            LstmLayer::new(
                w_ih,
                Array2::<f32>::zeros((4 * hidden, hidden)),
                bias,
                Array1::<f32>::zeros(4 * hidden),
            )
            .expect("color layer shapes agree")
        })
        .collect();
    let lstm = Lstm::new(layers).expect("color stack is consistent");

    // Each word owns a lane: the lane that is lit picks the next word, and
    // the word's embedding lights its own lane for the following step.
    let vocab_size = vocabulary.len();
    let mut embed = Array2::<f32>::zeros((vocab_size, embed_size));
    let mut linear = Array2::<f32>::zeros((vocab_size, hidden));
    let mut bias = Array1::<f32>::zeros(vocab_size);
    bias[END_ID as usize] = 0.1;
    let mut next_lane = BLUE_LANE + 1;
    for (lane, words) in [(RED_LANE, ["dog", "runs"]), (BLUE_LANE, ["cat", "sits"])] {
        let mut lit = lane;
        for word in words {
            let id = vocabulary.token_to_id(word) as usize;
            linear[[id, lit]] = 4.0;
            embed[[id, next_lane]] = 1.0;
            lit = next_lane;
            next_lane += 1;
        }
        linear[[END_ID as usize, lit]] = 4.0;
    }
    let decoder = Decoder::new(embed, lstm, linear, bias).expect("color decoder shapes agree");

    Captioner::new(vocabulary, encoder, decoder, &model, limits)
        .expect("color captioner is consistent")
}

/// Encode a single-color image as PNG bytes.
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> image::ImageResult<Vec<u8>> {
    let image = RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}
