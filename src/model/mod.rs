pub(crate) mod cells;
pub(crate) mod rnn_decoder;
