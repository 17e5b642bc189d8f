// Decoder tuning knobs; defaults match the canonical wire contract.

/// Largest `string32`/`yson32` payload accepted by default.
pub const DEFAULT_MAX_STRING_LEN: usize = 256 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecoderOptions {
    pub max_string_len: usize,
    pub strict_booleans: bool,
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            strict_booleans: true,
        }
    }

    pub fn with_max_string_len(mut self, max_string_len: usize) -> Self {
        self.max_string_len = max_string_len;
        self
    }

    /// Accept any nonzero boolean byte as `true` instead of failing.
    pub fn with_strict_booleans(mut self, strict_booleans: bool) -> Self {
        self.strict_booleans = strict_booleans;
        self
    }
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self::new()
    }
}
