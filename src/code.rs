//! Code acquisition: the three mutually-exclusive ways a session learns its wormhole code,
//! and the collaborator trait an interactive frontend would sit behind.

use crate::error::UsageError;
use crate::ids::{Code, Nameplate, Password};
use crate::wordlist::Wordlist;

/// Tracks which of `set_code`/`get_code`/`input_code` has claimed this session, mirroring
/// the teacher's `CodeMachine` states but collapsed to what the driver loop needs to
/// enforce "only one, only once".
#[derive(Debug, Default, PartialEq, Eq)]
pub enum CodeState {
    #[default]
    Idle,
    /// `get_code` sent `allocate` and is waiting for `allocated`.
    Allocating,
    /// `input_code` sent `list` and is waiting on the collaborator to pick a nameplate.
    Inputting,
    /// A code has been chosen; no further acquisition calls are allowed.
    Known(Code),
}

impl CodeState {
    /// Claim the "acquiring a code" slot for `set_code`, failing if one of the three
    /// entry points already ran.
    pub fn begin_set(&self, code: &Code) -> Result<Code, UsageError> {
        self.check_idle()?;
        Ok(code.clone())
    }

    pub fn begin_allocate(&self) -> Result<(), UsageError> {
        self.check_idle()
    }

    pub fn begin_input(&self) -> Result<(), UsageError> {
        self.check_idle()
    }

    fn check_idle(&self) -> Result<(), UsageError> {
        match self {
            CodeState::Idle => Ok(()),
            _ => Err(UsageError::CodeAcquisitionAlreadyInProgress),
        }
    }

    pub fn code(&self) -> Option<&Code> {
        match self {
            CodeState::Known(code) => Some(code),
            _ => None,
        }
    }
}

/// Combine an allocated nameplate with freshly-chosen words into a full code.
pub fn complete_allocated_code(nameplate: &Nameplate, wordlist: &Wordlist) -> Code {
    let password = wordlist.choose_words();
    Code::new(nameplate, &password)
}

/// The interactive collaborator a terminal UI would implement to let a user pick from the
/// nameplates currently open on the server, then type the trailing words. This crate ships
/// only the trait and a scriptable test double; a real interactive implementation lives
/// outside the client core.
///
/// `#[async_trait]` because the session stores this behind `Arc<dyn CodeInputHelper>`, and
/// async fns in traits aren't dyn-compatible without it.
#[async_trait::async_trait]
pub trait CodeInputHelper: Send + Sync {
    /// Choose one of the currently-listed nameplates.
    async fn choose_nameplate(&self, available: &[Nameplate]) -> Nameplate;

    /// Provide the trailing words to complete the code.
    async fn choose_words(&self) -> Password;
}

/// A `CodeInputHelper` that always returns a pre-scripted answer, used in tests in place
/// of an interactive terminal.
pub struct FixedCodeInputHelper {
    pub nameplate: Nameplate,
    pub password: Password,
}

impl FixedCodeInputHelper {
    pub fn new(nameplate: Nameplate, password: Password) -> Self {
        Self { nameplate, password }
    }
}

#[async_trait::async_trait]
impl CodeInputHelper for FixedCodeInputHelper {
    async fn choose_nameplate(&self, _available: &[Nameplate]) -> Nameplate {
        self.nameplate.clone()
    }

    async fn choose_words(&self) -> Password {
        self.password.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idle_allows_any_single_start() {
        let s = CodeState::Idle;
        assert!(s.begin_allocate().is_ok());
    }

    #[test]
    fn non_idle_rejects_further_starts() {
        let s = CodeState::Allocating;
        assert_eq!(s.begin_set(&"4-a-b".parse().unwrap()), Err(UsageError::CodeAcquisitionAlreadyInProgress));
        assert_eq!(s.begin_allocate(), Err(UsageError::CodeAcquisitionAlreadyInProgress));
        assert_eq!(s.begin_input(), Err(UsageError::CodeAcquisitionAlreadyInProgress));
    }

    #[test]
    fn complete_allocated_code_prefixes_nameplate() {
        let wordlist = Wordlist::default_wordlist(2);
        let code = complete_allocated_code(&Nameplate::new("4"), &wordlist);
        assert!(code.as_ref().starts_with("4-"));
    }

    #[async_std::test]
    async fn fixed_helper_returns_scripted_answers() {
        let helper = FixedCodeInputHelper::new(Nameplate::new("4"), Password("a-b".into()));
        assert_eq!(helper.choose_nameplate(&[]).await, Nameplate::new("4"));
        assert_eq!(helper.choose_words().await.0, "a-b");
    }
}
