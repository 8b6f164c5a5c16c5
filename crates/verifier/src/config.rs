#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationLevel {
    /// Structure, control flow and reachability only.
    Fast,
    Standard,
    Full,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub level: VerificationLevel,
    /// Stop collecting diagnostics after this many. `0` means unlimited.
    pub max_diagnostics: usize,
    pub check_types: bool,
    pub check_dominance: bool,
}

impl VerifierConfig {
    pub fn for_level(level: VerificationLevel) -> Self {
        match level {
            VerificationLevel::Fast => Self {
                level,
                max_diagnostics: 200,
                check_types: false,
                check_dominance: false,
            },
            VerificationLevel::Standard => Self {
                level,
                max_diagnostics: 200,
                check_types: true,
                check_dominance: true,
            },
            VerificationLevel::Full => Self {
                level,
                max_diagnostics: 0,
                check_types: true,
                check_dominance: true,
            },
        }
    }

    pub fn should_check_types(&self) -> bool {
        self.check_types
    }

    pub fn should_check_dominance(&self) -> bool {
        self.check_dominance || matches!(self.level, VerificationLevel::Full)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::for_level(VerificationLevel::Standard)
    }
}
