use serde::{Deserialize, Serialize};

/// Lifecycle states of an upload session.
///
/// `status` is advisory: it never gates whether a `chunk` frame is accepted
/// (see [`crate::record::SessionRecord::advance_offset`]). Completion is not
/// a variant of this enum — a completed session's record is deleted rather
/// than transitioned into a terminal state (see the session manager crate).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created by the first `start` for this upload id.
    Started,
    /// At least one chunk has been accepted since the last `start`/`resume`.
    Uploading,
    /// Paused by an explicit `pause` frame.
    Paused,
    /// Resumed, either via an explicit `resume` frame or a second `start`.
    Resumed,
    /// Stopped by an explicit `stop` frame.
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Started => "started",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_spelling() {
        assert_eq!(SessionStatus::Started.to_string(), "started");
        assert_eq!(SessionStatus::Uploading.to_string(), "uploading");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Resumed).unwrap();
        assert_eq!(json, "\"resumed\"");
    }
}
