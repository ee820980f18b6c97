use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Dropout, Embedding, Linear, VarBuilder};

use crate::config::{CellKind, DecoderConfig};
use crate::model::cells::{DecoderState, RecurrentLayer};

/// Embedding → dropout → stacked recurrent layers → Linear/tanh/Linear → log-softmax.
pub(crate) struct RnnDecoder {
    embedding: Embedding,
    dropout: Dropout,
    layers: Vec<RecurrentLayer>,
    fc_hidden: Linear,
    fc_out: Linear,
    kind: CellKind,
    hidden_dim: usize,
    dtype: DType,
    device: Device,
}

impl RnnDecoder {
    pub(crate) fn load(cfg: &DecoderConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let h = cfg.hidden_state_dim;
        let rnn = vb.pp("rnn");
        let layers = (0..cfg.num_layers)
            .map(|i| RecurrentLayer::load(cfg.rnn_type, h, h, rnn.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            embedding: candle_nn::embedding(cfg.vocab_size, h, vb.pp("embedding"))?,
            dropout: Dropout::new(cfg.dropout_p),
            layers,
            fc_hidden: candle_nn::linear(h, h, vb.pp("fc.0"))?,
            fc_out: candle_nn::linear(h, cfg.vocab_size, vb.pp("fc.2"))?,
            kind: cfg.rnn_type,
            hidden_dim: h,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    pub(crate) fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn dtype(&self) -> DType {
        self.dtype
    }

    pub(crate) fn init_state(&self, batch_size: usize) -> candle_core::Result<DecoderState> {
        DecoderState::zeros(
            self.kind,
            self.layers.len(),
            batch_size,
            self.hidden_dim,
            self.dtype,
            &self.device,
        )
    }

    /// `input_ids`: [batch, steps] u32. Returns [batch, steps, vocab] log-probabilities
    /// and the state after the last step.
    pub(crate) fn forward(
        &self,
        input_ids: &Tensor,
        state: &DecoderState,
        train: bool,
    ) -> candle_core::Result<(Tensor, DecoderState)> {
        let embedded = self.embedding.forward(input_ids)?;
        let embedded = self.dropout.forward(&embedded, train)?;
        let (outputs, state) = self.unroll(&embedded, state, train)?;
        let hidden = self.fc_hidden.forward(&outputs)?.tanh()?;
        let logits = self.fc_out.forward(&hidden)?;
        Ok((candle_nn::ops::log_softmax(&logits, D::Minus1)?, state))
    }

    /// Runs every layer over the whole sequence before moving to the next one.
    /// Dropout sits between layers, not after the last.
    fn unroll(
        &self,
        input: &Tensor,
        state: &DecoderState,
        train: bool,
    ) -> candle_core::Result<(Tensor, DecoderState)> {
        let steps = input.dim(1)?;
        let mut layer_input = input.clone();
        let mut next_states = Vec::with_capacity(self.layers.len());

        for (idx, (layer, layer_state)) in self.layers.iter().zip(state.layers()).enumerate() {
            let mut cell_state = layer_state.clone();
            let mut outputs = Vec::with_capacity(steps);
            for t in 0..steps {
                let x = layer_input.narrow(1, t, 1)?.squeeze(1)?.contiguous()?;
                cell_state = layer.step(&x, &cell_state)?;
                outputs.push(cell_state.hidden().clone());
            }
            layer_input = Tensor::stack(&outputs, 1)?;
            if idx + 1 < self.layers.len() {
                layer_input = self.dropout.forward(&layer_input, train)?;
            }
            next_states.push(cell_state);
        }

        Ok((layer_input, DecoderState::from_layers(self.kind, next_states)))
    }
}

#[cfg(test)]
mod tests {
    use candle_nn::VarMap;

    use super::*;

    fn decoder(kind: CellKind, varmap: &VarMap) -> RnnDecoder {
        let cfg = DecoderConfig {
            vocab_size: 7,
            hidden_state_dim: 6,
            num_layers: 2,
            rnn_type: kind,
            dropout_p: 0.0,
            ..DecoderConfig::default()
        };
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        RnnDecoder::load(&cfg, vb).expect("decoder builds")
    }

    #[test]
    fn forward_shapes_and_normalization() {
        for kind in CellKind::ALL {
            let varmap = VarMap::new();
            let model = decoder(kind, &varmap);
            let ids = Tensor::new(&[[1u32, 4, 5], [1, 6, 0]], &Device::Cpu).unwrap();
            let state = model.init_state(2).unwrap();
            let (log_probs, next) = model.forward(&ids, &state, false).unwrap();
            assert_eq!(log_probs.dims(), &[2, 3, 7]);
            assert_eq!(next.hidden().unwrap().dims(), &[2, 2, 6]);

            let sums: Vec<Vec<f32>> = log_probs
                .exp()
                .unwrap()
                .sum(D::Minus1)
                .unwrap()
                .to_vec2()
                .unwrap();
            for row in sums {
                for s in row {
                    assert!((s - 1.0).abs() < 1e-4, "{kind}: sum {s}");
                }
            }
        }
    }

    #[test]
    fn stepwise_matches_sequence_with_threaded_state() {
        let varmap = VarMap::new();
        let model = decoder(CellKind::Lstm, &varmap);
        let ids = Tensor::new(&[[1u32, 4, 5]], &Device::Cpu).unwrap();
        let (whole, _) = model.forward(&ids, &model.init_state(1).unwrap(), false).unwrap();

        let mut state = model.init_state(1).unwrap();
        let mut steps = Vec::new();
        for t in 0..3 {
            let (out, next) = model.forward(&ids.narrow(1, t, 1).unwrap(), &state, false).unwrap();
            steps.push(out);
            state = next;
        }
        let stepped = Tensor::cat(&steps, 1).unwrap();
        let diff: f32 = (whole - stepped)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(diff < 1e-5);
    }

    #[test]
    fn parameters_follow_layer_names() {
        let varmap = VarMap::new();
        let _ = decoder(CellKind::Rnn, &varmap);
        let data = varmap.data().lock().unwrap();
        for name in [
            "embedding.weight",
            "rnn.layers.0.weight_ih_l0",
            "rnn.layers.1.bias_hh_l0",
            "fc.0.weight",
            "fc.2.bias",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
    }
}
