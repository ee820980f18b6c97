use candle_core::{DType, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use rand::Rng;

use crate::config::DecoderConfig;
use crate::error::SpeechTokError;
use crate::model::cells::DecoderState;
use crate::model::rnn_decoder::RnnDecoder;
use crate::pipeline::traits::Tokenizer;

/// How the decoder picks the input of each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Ground-truth targets (end-of-sequence ids removed) feed every step in one pass.
    TeacherForcing,
    /// Each step consumes the argmax of the previous step, for `max_length` steps.
    FreeRunning,
}

impl DecodeMode {
    /// One draw per invocation: teacher forcing when a uniform sample in
    /// [0, 1) falls below `teacher_forcing_ratio`.
    pub fn draw<R: Rng>(rng: &mut R, teacher_forcing_ratio: f64) -> Self {
        if rng.random::<f64>() < teacher_forcing_ratio {
            Self::TeacherForcing
        } else {
            Self::FreeRunning
        }
    }
}

/// Autoregressive recurrent decoder producing per-step log-probabilities
/// over the vocabulary.
pub struct SequenceDecoder {
    model: RnnDecoder,
    config: DecoderConfig,
    training: bool,
    var_map: Option<VarMap>,
}

impl SequenceDecoder {
    pub fn new(config: DecoderConfig, vb: VarBuilder) -> Result<Self, SpeechTokError> {
        config.validate()?;
        let model =
            RnnDecoder::load(&config, vb).map_err(|e| SpeechTokError::runtime("build decoder", e))?;
        tracing::info!(
            vocab = config.vocab_size,
            hidden = config.hidden_state_dim,
            layers = config.num_layers,
            cell = %config.rnn_type,
            max_length = config.max_length,
            device = ?model.device(),
            "sequence decoder built"
        );
        Ok(Self {
            model,
            config,
            training: false,
            var_map: None,
        })
    }

    pub(crate) fn with_var_map(mut self, var_map: VarMap) -> Self {
        self.var_map = Some(var_map);
        self
    }

    /// Parameters of a freshly initialised decoder; `None` when loaded from weights.
    pub fn var_map(&self) -> Option<&VarMap> {
        self.var_map.as_ref()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Dropout is active only in training mode.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Zero state, [layers, batch, hidden] per component.
    pub fn init_state(&self, batch_size: usize) -> Result<DecoderState, SpeechTokError> {
        self.model
            .init_state(batch_size)
            .map_err(|e| SpeechTokError::runtime("init decoder state", e))
    }

    /// Decodes `targets` ([batch, steps] ids) with a mode drawn from `rng`.
    ///
    /// Returns [batch, steps', vocab] log-probabilities: `steps'` is the target
    /// length minus the per-row end-of-sequence count under teacher forcing,
    /// `max_length` when free-running.
    pub fn forward<R: Rng>(
        &self,
        targets: &Tensor,
        teacher_forcing_ratio: f64,
        rng: &mut R,
    ) -> Result<Tensor, SpeechTokError> {
        if !(0.0..=1.0).contains(&teacher_forcing_ratio) {
            return Err(SpeechTokError::invalid_input(format!(
                "teacher_forcing_ratio must be in [0, 1], got {teacher_forcing_ratio}"
            )));
        }
        let mode = DecodeMode::draw(rng, teacher_forcing_ratio);
        tracing::debug!(?mode, teacher_forcing_ratio, "decode mode drawn");
        self.forward_with_mode(targets, mode)
    }

    pub fn forward_with_mode(
        &self,
        targets: &Tensor,
        mode: DecodeMode,
    ) -> Result<Tensor, SpeechTokError> {
        let rows = self.host_targets(targets)?;
        let batch_size = rows.len();
        match mode {
            DecodeMode::TeacherForcing => {
                let (inputs, steps) = strip_eos(&rows, self.config.eos_id as u32)?;
                if steps == 0 {
                    return self.empty_output(batch_size);
                }
                let inputs = Tensor::from_vec(inputs, (batch_size, steps), self.model.device())
                    .map_err(|e| SpeechTokError::runtime("teacher forcing inputs", e))?;
                let state = self.init_state(batch_size)?;
                let (log_probs, _) = self
                    .model
                    .forward(&inputs, &state, self.training)
                    .map_err(|e| SpeechTokError::runtime("teacher forcing decode", e))?;
                Ok(log_probs)
            }
            DecodeMode::FreeRunning => {
                let mut first = Vec::with_capacity(batch_size);
                for row in &rows {
                    let id = row.first().copied().ok_or_else(|| {
                        SpeechTokError::invalid_input(
                            "free-running decode needs at least one target column",
                        )
                    })?;
                    first.push(id);
                }
                self.free_running(first)
            }
        }
    }

    /// Free-running decode of `batch_size` sequences seeded with the
    /// start-of-sequence id.
    pub fn generate(&self, batch_size: usize) -> Result<Tensor, SpeechTokError> {
        self.free_running(vec![self.config.sos_id as u32; batch_size])
    }

    fn free_running(&self, first: Vec<u32>) -> Result<Tensor, SpeechTokError> {
        let batch_size = first.len();
        if self.config.max_length == 0 || batch_size == 0 {
            return self.empty_output(batch_size);
        }
        let state = self.init_state(batch_size)?;
        self.run_free(first, state)
            .map_err(|e| SpeechTokError::runtime("free-running decode", e))
    }

    /// State is threaded from step to step.
    fn run_free(&self, first: Vec<u32>, mut state: DecoderState) -> candle_core::Result<Tensor> {
        let batch_size = first.len();
        let mut input = Tensor::from_vec(first, (batch_size, 1), self.model.device())?;
        let mut steps = Vec::with_capacity(self.config.max_length);
        for _ in 0..self.config.max_length {
            let (log_probs, next_state) = self.model.forward(&input, &state, self.training)?;
            let step = log_probs.squeeze(1)?;
            input = step.argmax_keepdim(D::Minus1)?;
            steps.push(step);
            state = next_state;
        }
        Tensor::stack(&steps, 1)
    }

    fn empty_output(&self, batch_size: usize) -> Result<Tensor, SpeechTokError> {
        Tensor::zeros(
            (batch_size, 0, self.config.vocab_size),
            self.model.dtype(),
            self.model.device(),
        )
        .map_err(|e| SpeechTokError::runtime("empty decoder output", e))
    }

    fn host_targets(&self, targets: &Tensor) -> Result<Vec<Vec<u32>>, SpeechTokError> {
        let rows: Vec<Vec<u32>> = targets
            .to_dtype(DType::U32)
            .and_then(|t| t.to_vec2())
            .map_err(|e| SpeechTokError::runtime("read decoder targets", e))?;
        if rows.is_empty() {
            return Err(SpeechTokError::invalid_input("decoder targets have no rows"));
        }
        let vocab = self.config.vocab_size;
        if let Some(&id) = rows.iter().flatten().find(|&&id| id as usize >= vocab) {
            return Err(SpeechTokError::invalid_input(format!(
                "target id {id} is outside the vocabulary (size {vocab})"
            )));
        }
        Ok(rows)
    }
}

/// Drops every end-of-sequence id, row-major. All rows must keep the same length.
fn strip_eos(rows: &[Vec<u32>], eos_id: u32) -> Result<(Vec<u32>, usize), SpeechTokError> {
    let mut flat = Vec::new();
    let mut width = None;
    for (idx, row) in rows.iter().enumerate() {
        let before = flat.len();
        flat.extend(row.iter().copied().filter(|&id| id != eos_id));
        let kept = flat.len() - before;
        match width {
            None => width = Some(kept),
            Some(w) if w != kept => {
                return Err(SpeechTokError::invalid_input(format!(
                    "row {idx} keeps {kept} ids after end-of-sequence removal, row 0 keeps {w}"
                )));
            }
            Some(_) => {}
        }
    }
    Ok((flat, width.unwrap_or(0)))
}

/// Greedy transcripts from [batch, steps, vocab] decoder output.
pub fn greedy_transcripts(
    tokenizer: &dyn Tokenizer,
    log_probs: &Tensor,
) -> Result<Vec<String>, SpeechTokError> {
    let best: Vec<Vec<u32>> = log_probs
        .argmax(D::Minus1)
        .and_then(|t| t.to_vec2())
        .map_err(|e| SpeechTokError::runtime("greedy argmax", e))?;
    let ids: Vec<Vec<usize>> = best
        .into_iter()
        .map(|row| row.into_iter().map(|id| id as usize).collect())
        .collect();
    tokenizer.decode_batch(&ids)
}

#[cfg(test)]
mod tests {
    use candle_core::Device;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    use super::*;
    use crate::config::CellKind;
    use crate::labels::character::CharacterTokenizer;
    use crate::labels::vocabulary::Vocabulary;
    use crate::types::SpecialTokens;

    /// Always yields the largest sample, i.e. just below 1.0.
    struct MaxRng;

    impl RngCore for MaxRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }
        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }
        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(u8::MAX);
        }
    }

    fn config(kind: CellKind) -> DecoderConfig {
        DecoderConfig {
            vocab_size: 8,
            max_length: 5,
            hidden_state_dim: 6,
            num_layers: 2,
            rnn_type: kind,
            dropout_p: 0.2,
            ..DecoderConfig::default()
        }
    }

    fn decoder(cfg: DecoderConfig) -> SequenceDecoder {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        SequenceDecoder::new(cfg, vb)
            .expect("decoder builds")
            .with_var_map(varmap)
    }

    fn targets() -> Tensor {
        // sos a b eos / sos b eos pad
        Tensor::new(&[[1u32, 4, 5, 2], [1, 5, 2, 0]], &Device::Cpu).unwrap()
    }

    fn assert_normalized(log_probs: &Tensor) {
        let sums: Vec<f32> = log_probs
            .exp()
            .unwrap()
            .sum(D::Minus1)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4, "sum {s}");
        }
    }

    #[test]
    fn teacher_forcing_drops_eos_steps() {
        for kind in CellKind::ALL {
            let dec = decoder(config(kind));
            let out = dec
                .forward_with_mode(&targets(), DecodeMode::TeacherForcing)
                .unwrap();
            assert_eq!(out.dims(), &[2, 3, 8], "{kind}");
            assert_normalized(&out);
        }
    }

    #[test]
    fn free_running_emits_max_length_steps() {
        for kind in CellKind::ALL {
            let dec = decoder(config(kind));
            let out = dec
                .forward_with_mode(&targets(), DecodeMode::FreeRunning)
                .unwrap();
            assert_eq!(out.dims(), &[2, 5, 8], "{kind}");
            assert_normalized(&out);
        }
    }

    #[test]
    fn free_running_keeps_going_after_predicted_eos() {
        let cfg = config(CellKind::Lstm);
        let dec = decoder(cfg.clone());
        let mut bias = vec![0f32; cfg.vocab_size];
        bias[cfg.eos_id] = 100.0;
        let bias = Tensor::new(bias.as_slice(), &Device::Cpu).unwrap();
        dec.var_map()
            .expect("fresh decoder owns its parameters")
            .data()
            .lock()
            .unwrap()
            .get("fc.2.bias")
            .expect("output projection bias")
            .set(&bias)
            .unwrap();

        let out = dec.generate(2).unwrap();
        assert_eq!(out.dims(), &[2, cfg.max_length, cfg.vocab_size]);
        let best: Vec<Vec<u32>> = out.argmax(D::Minus1).unwrap().to_vec2().unwrap();
        for row in best {
            assert_eq!(row[0], cfg.eos_id as u32);
            assert!(row.iter().all(|&id| id == cfg.eos_id as u32));
        }
    }

    #[test]
    fn ratio_one_always_teacher_forces() {
        assert_eq!(DecodeMode::draw(&mut MaxRng, 1.0), DecodeMode::TeacherForcing);
        let dec = decoder(config(CellKind::Lstm));
        let out = dec.forward(&targets(), 1.0, &mut MaxRng).unwrap();
        assert_eq!(out.dims(), &[2, 3, 8]);
    }

    #[test]
    fn ratio_zero_always_free_runs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            assert_eq!(DecodeMode::draw(&mut rng, 0.0), DecodeMode::FreeRunning);
        }
        let dec = decoder(config(CellKind::Gru));
        let out = dec.forward(&targets(), 0.0, &mut rng).unwrap();
        assert_eq!(out.dims(), &[2, 5, 8]);
    }

    #[test]
    fn ratio_outside_unit_interval_is_rejected() {
        let dec = decoder(config(CellKind::Rnn));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(dec.forward(&targets(), 1.5, &mut rng).is_err());
        assert!(dec.forward(&targets(), -0.1, &mut rng).is_err());
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let dec = decoder(config(CellKind::Lstm));
        assert!(!dec.is_training());
        let a = dec.generate(2).unwrap();
        let b = dec.generate(2).unwrap();
        let diff: f32 = (a - b)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn training_mode_toggles() {
        let mut dec = decoder(config(CellKind::Gru));
        dec.set_training(true);
        assert!(dec.is_training());
        let out = dec
            .forward_with_mode(&targets(), DecodeMode::TeacherForcing)
            .unwrap();
        assert_eq!(out.dims(), &[2, 3, 8]);
        dec.set_training(false);
        assert!(!dec.is_training());
    }

    #[test]
    fn zero_max_length_yields_empty_sequence() {
        let dec = decoder(DecoderConfig {
            max_length: 0,
            ..config(CellKind::Rnn)
        });
        let out = dec.generate(3).unwrap();
        assert_eq!(out.dims(), &[3, 0, 8]);
    }

    #[test]
    fn all_eos_targets_yield_empty_sequence() {
        let dec = decoder(config(CellKind::Lstm));
        let t = Tensor::new(&[[2u32, 2], [2, 2]], &Device::Cpu).unwrap();
        let out = dec.forward_with_mode(&t, DecodeMode::TeacherForcing).unwrap();
        assert_eq!(out.dims(), &[2, 0, 8]);
    }

    #[test]
    fn uneven_eos_counts_are_rejected() {
        let dec = decoder(config(CellKind::Lstm));
        let t = Tensor::new(&[[1u32, 4, 2], [1, 4, 5]], &Device::Cpu).unwrap();
        let err = dec
            .forward_with_mode(&t, DecodeMode::TeacherForcing)
            .unwrap_err();
        assert!(matches!(err, SpeechTokError::InvalidInput { .. }));
    }

    #[test]
    fn out_of_vocab_targets_are_rejected() {
        let dec = decoder(config(CellKind::Lstm));
        let t = Tensor::new(&[[1u32, 40]], &Device::Cpu).unwrap();
        assert!(dec.forward_with_mode(&t, DecodeMode::TeacherForcing).is_err());
    }

    #[test]
    fn state_shape_matches_layers() {
        let dec = decoder(config(CellKind::Lstm));
        let state = dec.init_state(3).unwrap();
        assert_eq!(state.hidden().unwrap().dims(), &[2, 3, 6]);
        assert!(state.carry().unwrap().is_some());
        let dec = decoder(config(CellKind::Rnn));
        assert!(dec.init_state(3).unwrap().carry().unwrap().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = DecoderConfig {
            vocab_size: 0,
            ..DecoderConfig::default()
        };
        assert!(SequenceDecoder::new(cfg, vb).is_err());
    }

    #[test]
    fn greedy_transcripts_decode_argmax() {
        let tokens = SpecialTokens::default();
        let tok = CharacterTokenizer::from_vocabulary(Vocabulary::build(["ab", "aab"], &tokens), &tokens)
            .unwrap();
        // vocab: <pad> <sos> <eos> <blank> a b
        let one_hot = |id: usize| -> Vec<f32> {
            (0..6).map(|i| if i == id { 0.0 } else { -10.0 }).collect()
        };
        let rows: Vec<f32> = [4, 3, 5, 2, 4]
            .iter()
            .flat_map(|&id| one_hot(id))
            .collect();
        let log_probs = Tensor::from_vec(rows, (1, 5, 6), &Device::Cpu).unwrap();
        assert_eq!(greedy_transcripts(&tok, &log_probs).unwrap(), vec!["ab".to_string()]);
    }
}
