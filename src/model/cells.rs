use candle_core::{DType, Device, Module, Tensor};
use candle_nn::rnn::{gru, lstm, GRUConfig, GRUState, LSTMConfig, LSTMState, GRU, LSTM, RNN};
use candle_nn::{Init, Linear, VarBuilder};

use crate::config::CellKind;
use crate::error::SpeechTokError;

/// Plain tanh recurrence: `h' = tanh(W_ih x + b_ih + W_hh h + b_hh)`.
pub(crate) struct TanhCell {
    input: Linear,
    recurrent: Linear,
}

impl TanhCell {
    fn load(in_dim: usize, hidden_dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let bound = 1.0 / (hidden_dim as f64).sqrt();
        let uniform = || Init::Uniform {
            lo: -bound,
            up: bound,
        };
        let w_ih = vb.get_with_hints((hidden_dim, in_dim), "weight_ih_l0", uniform())?;
        let w_hh = vb.get_with_hints((hidden_dim, hidden_dim), "weight_hh_l0", uniform())?;
        let b_ih = vb.get_with_hints(hidden_dim, "bias_ih_l0", uniform())?;
        let b_hh = vb.get_with_hints(hidden_dim, "bias_hh_l0", uniform())?;
        Ok(Self {
            input: Linear::new(w_ih, Some(b_ih)),
            recurrent: Linear::new(w_hh, Some(b_hh)),
        })
    }

    fn step(&self, input: &Tensor, h: &Tensor) -> candle_core::Result<Tensor> {
        (self.input.forward(input)? + self.recurrent.forward(h)?)?.tanh()
    }
}

/// One layer of the decoder's recurrent stack.
pub(crate) enum RecurrentLayer {
    Lstm(LSTM),
    Gru(GRU),
    Tanh(TanhCell),
}

impl RecurrentLayer {
    pub(crate) fn load(
        kind: CellKind,
        in_dim: usize,
        hidden_dim: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        match kind {
            CellKind::Lstm => lstm(in_dim, hidden_dim, LSTMConfig::default(), vb).map(Self::Lstm),
            CellKind::Gru => gru(in_dim, hidden_dim, GRUConfig::default(), vb).map(Self::Gru),
            CellKind::Rnn => TanhCell::load(in_dim, hidden_dim, vb).map(Self::Tanh),
        }
    }

    /// `input`: [batch, in_dim].
    pub(crate) fn step(&self, input: &Tensor, state: &CellState) -> candle_core::Result<CellState> {
        match (self, state) {
            (Self::Lstm(cell), CellState::Dual(s)) => cell.step(input, s).map(CellState::Dual),
            (Self::Gru(cell), CellState::Single(h)) => cell
                .step(input, &GRUState { h: h.clone() })
                .map(|s| CellState::Single(s.h)),
            (Self::Tanh(cell), CellState::Single(h)) => cell.step(input, h).map(CellState::Single),
            _ => Err(candle_core::Error::Msg(
                "recurrent state does not match the layer's cell kind".to_string(),
            )),
        }
    }
}

/// State of one recurrent layer.
#[derive(Debug, Clone)]
pub enum CellState {
    /// Hidden and carry state of a dual-state cell.
    Dual(LSTMState),
    Single(Tensor),
}

impl CellState {
    fn zeros(
        kind: CellKind,
        batch_size: usize,
        hidden_dim: usize,
        dtype: DType,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let zeros = Tensor::zeros((batch_size, hidden_dim), dtype, device)?;
        Ok(if kind.is_dual_state() {
            Self::Dual(LSTMState::new(zeros.clone(), zeros))
        } else {
            Self::Single(zeros)
        })
    }

    /// [batch, hidden_dim]
    pub fn hidden(&self) -> &Tensor {
        match self {
            Self::Dual(s) => &s.h,
            Self::Single(h) => h,
        }
    }

    pub fn carry(&self) -> Option<&Tensor> {
        match self {
            Self::Dual(s) => Some(&s.c),
            Self::Single(_) => None,
        }
    }
}

/// Recurrent state of the whole decoder stack for one invocation.
#[derive(Debug, Clone)]
pub struct DecoderState {
    kind: CellKind,
    layers: Vec<CellState>,
}

impl DecoderState {
    pub(crate) fn zeros(
        kind: CellKind,
        num_layers: usize,
        batch_size: usize,
        hidden_dim: usize,
        dtype: DType,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let layers = (0..num_layers)
            .map(|_| CellState::zeros(kind, batch_size, hidden_dim, dtype, device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { kind, layers })
    }

    pub(crate) fn from_layers(kind: CellKind, layers: Vec<CellState>) -> Self {
        Self { kind, layers }
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn layers(&self) -> &[CellState] {
        &self.layers
    }

    /// Hidden state stacked as [layers, batch, hidden_dim].
    pub fn hidden(&self) -> Result<Tensor, SpeechTokError> {
        let hidden: Vec<&Tensor> = self.layers.iter().map(CellState::hidden).collect();
        Tensor::stack(&hidden, 0).map_err(|e| SpeechTokError::runtime("stack hidden state", e))
    }

    /// Carry state as [layers, batch, hidden_dim]; `None` for single-state cells.
    pub fn carry(&self) -> Result<Option<Tensor>, SpeechTokError> {
        let carry: Option<Vec<&Tensor>> = self.layers.iter().map(CellState::carry).collect();
        carry
            .map(|c| Tensor::stack(&c, 0))
            .transpose()
            .map_err(|e| SpeechTokError::runtime("stack carry state", e))
    }
}
