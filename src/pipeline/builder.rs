use std::path::PathBuf;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use crate::config::DecoderConfig;
use crate::error::SpeechTokError;
use crate::pipeline::decoder::SequenceDecoder;
use crate::pipeline::traits::Tokenizer;

pub struct SequenceDecoderBuilder {
    config: DecoderConfig,
    device: String,
    weights_path: Option<PathBuf>,
    training: bool,
}

impl SequenceDecoderBuilder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            device: "cpu".to_string(),
            weights_path: None,
            training: false,
        }
    }

    /// `"cuda"` selects the first CUDA device, anything else the CPU.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Safetensors file to load parameters from instead of fresh initialisation.
    pub fn with_weights_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights_path = Some(path.into());
        self
    }

    /// Vocabulary size and special ids from the tokenizer.
    pub fn with_tokenizer(mut self, tokenizer: &dyn Tokenizer) -> Self {
        self.config = self.config.with_tokenizer(tokenizer);
        self
    }

    pub fn with_training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    pub fn build(self) -> Result<SequenceDecoder, SpeechTokError> {
        let device = match self.device.as_str() {
            "cuda" => Device::new_cuda(0).map_err(|e| SpeechTokError::runtime("CUDA init", e))?,
            _ => Device::Cpu,
        };

        let mut decoder = match &self.weights_path {
            Some(path) => {
                let data = std::fs::read(path)
                    .map_err(|e| SpeechTokError::io("read safetensors", e))?;
                let vb = VarBuilder::from_buffered_safetensors(data, DType::F32, &device)
                    .map_err(|e| SpeechTokError::runtime("load safetensors", e))?;
                tracing::info!(path = %path.display(), "decoder weights loaded");
                SequenceDecoder::new(self.config, vb)?
            }
            None => {
                let var_map = VarMap::new();
                let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);
                SequenceDecoder::new(self.config, vb)?.with_var_map(var_map)
            }
        };
        decoder.set_training(self.training);
        Ok(decoder)
    }
}
