//! CLIP model loading and inference using tract.

use image::RgbImage;
use std::path::Path;
use tokenizers::Tokenizer;
use tract_onnx::prelude::*;

use super::device::Device;
use super::preprocess::{preprocess, IMAGE_SIZE};
use super::{classification_from_logits, ImageClassifier};
use crate::error::{ClassifyError, ModelError};
use crate::models::Classification;

/// Prompts scored against every image, in `[bird, not bird]` order.
pub const PROMPTS: [&str; 2] = ["a photo containing a bird", "a photo not containing a bird"];

const PAD_TOKEN: &str = "<|endoftext|>";
const LOGITS_OUTPUT: &str = "logits_per_image";

type ClipPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelInput {
    InputIds,
    AttentionMask,
    PixelValues,
}

impl ModelInput {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "input_ids" => Some(ModelInput::InputIds),
            "attention_mask" => Some(ModelInput::AttentionMask),
            "pixel_values" => Some(ModelInput::PixelValues),
            _ => None,
        }
    }
}

/// Tokenized prompts, padded to a common length.
#[derive(Debug, PartialEq)]
struct PromptBatch {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    seq_len: usize,
}

/// Joint image/text CLIP model with the prompt tensors baked in at load time.
pub struct ClipModel {
    plan: ClipPlan,
    inputs: Vec<ModelInput>,
    input_ids: Tensor,
    attention_mask: Tensor,
    device: Device,
}

impl ClipModel {
    /// Loads `model.onnx` and `tokenizer.json`, fixes the input shapes for the
    /// two prompts and optimizes the graph.
    pub fn load(model_path: &Path, tokenizer_path: &Path, device: Device) -> Result<Self, ModelError> {
        for path in [model_path, tokenizer_path] {
            if !path.is_file() {
                return Err(ModelError::MissingFile {
                    path: path.to_path_buf(),
                });
            }
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|source| ModelError::Tokenizer {
            path: tokenizer_path.to_path_buf(),
            source,
        })?;
        let prompts = tokenize_prompts(&tokenizer)?;
        tracing::debug!(seq_len = prompts.seq_len, "Tokenized prompts");

        let (plan, inputs) = load_plan(model_path, prompts.seq_len).map_err(|e| ModelError::Load {
            path: model_path.to_path_buf(),
            source: e.into(),
        })?;
        for required in ["input_ids", "attention_mask", "pixel_values"] {
            if !inputs.iter().any(|i| Some(*i) == ModelInput::from_name(required)) {
                return Err(ModelError::MissingInput { name: required });
            }
        }

        let shape = [PROMPTS.len(), prompts.seq_len];
        let input_ids = Tensor::from_shape(&shape, &prompts.input_ids).map_err(|e| ModelError::Load {
            path: model_path.to_path_buf(),
            source: e.into(),
        })?;
        let attention_mask =
            Tensor::from_shape(&shape, &prompts.attention_mask).map_err(|e| ModelError::Load {
                path: model_path.to_path_buf(),
                source: e.into(),
            })?;

        tracing::info!(model = %model_path.display(), %device, "CLIP model loaded");
        Ok(Self {
            plan,
            inputs,
            input_ids,
            attention_mask,
            device,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Runs one forward pass and returns the `[bird, not bird]` logits.
    fn logits(&self, image: &RgbImage) -> Result<Vec<f32>, ClassifyError> {
        let pixels: Tensor = preprocess(image)?.into();

        let inputs: TVec<TValue> = self
            .inputs
            .iter()
            .map(|input| -> TValue {
                match input {
                    ModelInput::InputIds => self.input_ids.clone().into(),
                    ModelInput::AttentionMask => self.attention_mask.clone().into(),
                    ModelInput::PixelValues => pixels.clone().into(),
                }
            })
            .collect();

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| ClassifyError::Inference(e.into()))?;
        let logits = outputs
            .first()
            .ok_or(ClassifyError::UnexpectedOutput { len: 0 })?
            .to_array_view::<f32>()
            .map_err(|e| ClassifyError::Inference(e.into()))?
            .iter()
            .copied()
            .collect();
        Ok(logits)
    }
}

impl ImageClassifier for ClipModel {
    fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifyError> {
        let logits = self.logits(image)?;
        classification_from_logits(&logits)
    }
}

/// Parses the ONNX graph, pins every input to a concrete shape and keeps only
/// the image-to-text logits as output.
fn load_plan(model_path: &Path, seq_len: usize) -> TractResult<(ClipPlan, Vec<ModelInput>)> {
    let mut model = tract_onnx::onnx().model_for_path(model_path)?;

    let names: Vec<String> = model
        .input_outlets()?
        .iter()
        .map(|outlet| model.node(outlet.node).name.clone())
        .collect();

    let mut inputs = Vec::with_capacity(names.len());
    for (ix, name) in names.iter().enumerate() {
        let input = ModelInput::from_name(name).ok_or_else(|| ModelError::UnexpectedInput {
            name: name.clone(),
        })?;
        let size = IMAGE_SIZE as usize;
        let fact: InferenceFact = match input {
            ModelInput::InputIds | ModelInput::AttentionMask => {
                i64::fact([PROMPTS.len(), seq_len]).into()
            }
            ModelInput::PixelValues => f32::fact([1, 3, size, size]).into(),
        };
        model.set_input_fact(ix, fact)?;
        inputs.push(input);
    }

    // Exports declare symbolic batch dims on every output; drop them so they
    // unify with the pinned inputs.
    for ix in 0..model.output_outlets()?.len() {
        model.set_output_fact(ix, InferenceFact::default())?;
    }
    model.set_output_names([LOGITS_OUTPUT])?;

    let plan = model.into_optimized()?.into_runnable()?;
    Ok((plan, inputs))
}

fn tokenize_prompts(tokenizer: &Tokenizer) -> Result<PromptBatch, ModelError> {
    let pad_id = tokenizer
        .token_to_id(PAD_TOKEN)
        .ok_or(ModelError::MissingPadToken { token: PAD_TOKEN })?;

    let mut sequences = Vec::with_capacity(PROMPTS.len());
    for prompt in PROMPTS {
        let encoding = tokenizer
            .encode(prompt, true)
            .map_err(|source| ModelError::Encode { prompt, source })?;
        sequences.push((
            encoding.get_ids().to_vec(),
            encoding.get_attention_mask().to_vec(),
        ));
    }
    Ok(pad_batch(&sequences, pad_id))
}

/// Right-pads `(ids, mask)` sequences to the longest one, masking the padding.
fn pad_batch(sequences: &[(Vec<u32>, Vec<u32>)], pad_id: u32) -> PromptBatch {
    let seq_len = sequences.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);

    let mut input_ids = Vec::with_capacity(sequences.len() * seq_len);
    let mut attention_mask = Vec::with_capacity(sequences.len() * seq_len);
    for (ids, mask) in sequences {
        let padding = seq_len - ids.len();
        input_ids.extend(ids.iter().map(|&id| i64::from(id)));
        input_ids.extend(std::iter::repeat(i64::from(pad_id)).take(padding));
        attention_mask.extend(mask.iter().map(|&m| i64::from(m)));
        attention_mask.extend(std::iter::repeat(0).take(padding));
    }

    PromptBatch {
        input_ids,
        attention_mask,
        seq_len,
    }
}
