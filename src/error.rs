use snafu::Snafu;

pub type TranslateResult<T> = Result<T, TranslateError>;

/// Everything that can go wrong between raw VM text and finished
/// assembly. Parse-time failures abort before any generation; symbol
/// failures abort after generation, before output is handed back.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TranslateError {
    #[snafu(display("{unit}: line {line}: malformed command \"{text}\": {message}"))]
    Malformed {
        unit: String,
        line: usize,
        text: String,
        message: String,
    },

    #[snafu(display("{unit}: line {line}: {segment} index {index} is out of range (max {max})"))]
    IndexOutOfRange {
        unit: String,
        line: usize,
        segment: &'static str,
        index: u16,
        max: u16,
    },

    #[snafu(display("unresolved symbol \"{symbol}\" ({origin})"))]
    Unresolved { symbol: String, origin: String },
}
