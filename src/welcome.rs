//! Interpretation of the server's `welcome` frame: MOTD logging, version-mismatch warning,
//! and fatal `error` signalling.

use tracing::warn;

use crate::error::WelcomeError;
use crate::server_messages::WelcomePayload;

/// Our own crate version, used for the version-mismatch comparison.
const OUR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tracks which welcome-triggered warnings have already fired, so repeat `welcome` frames
/// (which the protocol permits, though the server normally sends just one) don't spam.
#[derive(Debug, Default)]
pub struct WelcomeHandler {
    motd_logged: bool,
    version_warned: bool,
}

impl WelcomeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one `welcome` frame. Returns `Err` if the server refused the client; the
    /// caller is responsible for making that error sticky on the session.
    pub fn handle(&mut self, welcome: &WelcomePayload) -> Result<(), WelcomeError> {
        if let Some(error) = &welcome.error {
            return Err(WelcomeError(error.clone()));
        }

        if let Some(motd) = &welcome.motd {
            if !self.motd_logged {
                warn!("server has a message for us: {motd}");
                self.motd_logged = true;
            }
        }

        if let Some(current_version) = &welcome.current_version {
            if !self.version_warned
                && current_version != OUR_VERSION
                && !is_development_build(OUR_VERSION)
            {
                warn!("the wormhole client is out of date and should be updated");
                warn!("server wants {current_version}, we are {OUR_VERSION}");
                self.version_warned = true;
            }
        }

        Ok(())
    }
}

/// A version "looks like a development build" if it carries a pre-release suffix beyond
/// the bare `major.minor.patch` semver core, e.g. `0.1.0-dev`.
fn is_development_build(version: &str) -> bool {
    version.splitn(2, '-').nth(1).is_some()
}

#[cfg(test)]
mod test {
    use super::*;

    fn payload(motd: Option<&str>, version: Option<&str>, error: Option<&str>) -> WelcomePayload {
        WelcomePayload {
            motd: motd.map(str::to_string),
            current_version: version.map(str::to_string),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn error_field_is_fatal() {
        let mut h = WelcomeHandler::new();
        let err = h.handle(&payload(None, None, Some("go away"))).unwrap_err();
        assert_eq!(err.0, "go away");
    }

    #[test]
    fn motd_logs_only_once() {
        let mut h = WelcomeHandler::new();
        assert!(h.handle(&payload(Some("hi"), None, None)).is_ok());
        assert!(h.motd_logged);
        // Second welcome with the same motd must not panic or error; idempotence is the point.
        assert!(h.handle(&payload(Some("hi"), None, None)).is_ok());
    }

    #[test]
    fn version_warns_only_once() {
        let mut h = WelcomeHandler::new();
        h.handle(&payload(None, Some("99.0.0"), None)).unwrap();
        assert!(h.version_warned);
        h.handle(&payload(None, Some("99.0.0"), None)).unwrap();
    }

    #[test]
    fn development_build_suppresses_version_warning() {
        assert!(is_development_build("0.1.0-dev"));
        assert!(!is_development_build("0.1.0"));
    }
}
