//! Provenance attribution for edges.
//!
//! Every edge records who (or what) created it: a human, an AI assistant, a
//! system process, or an import. Attribution feeds the provenance filters
//! that later select edges by origin. All operations here are total:
//! defaults fill gaps and oversized text truncates, so resolving
//! attribution can never fail.

use std::fmt;

use crate::context::EnvSource;
use crate::text::{BoundedStr, AUTHOR_CAP, SESSION_CAP};

/// Environment variable naming the source kind (`human`, `claude`, `gpt`,
/// `system`).
pub const ENV_SOURCE: &str = "GRAPHMIND_SOURCE";
/// Environment variable overriding the author string.
pub const ENV_AUTHOR: &str = "GRAPHMIND_AUTHOR";
/// Environment variable overriding the session id.
pub const ENV_SESSION: &str = "GRAPHMIND_SESSION";

// ============================================================================
// Source kinds
// ============================================================================

/// Origin of an edge.
///
/// Wire values are fixed. `Unknown` is the out-of-band sentinel (255), so a
/// zeroed record reads as `Human` and genuinely missing attribution stays
/// distinguishable from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributionSource {
    Human = 0,
    AiClaude = 1,
    AiGpt = 2,
    AiOther = 3,
    System = 4,
    Import = 5,
    Unknown = 255,
}

impl AttributionSource {
    pub const fn wire_value(self) -> u8 {
        self as u8
    }

    /// Strict mapping from the wire; unknown discriminants are rejected.
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Human),
            1 => Some(Self::AiClaude),
            2 => Some(Self::AiGpt),
            3 => Some(Self::AiOther),
            4 => Some(Self::System),
            5 => Some(Self::Import),
            255 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Bit used by [`SourceMask`]. Deliberately distinct from the wire
    /// value: `Unknown` gets bit 6, not bit 255.
    pub const fn bit(self) -> u32 {
        match self {
            Self::Human => 1 << 0,
            Self::AiClaude => 1 << 1,
            Self::AiGpt => 1 << 2,
            Self::AiOther => 1 << 3,
            Self::System => 1 << 4,
            Self::Import => 1 << 5,
            Self::Unknown => 1 << 6,
        }
    }

    /// Short label for rendered output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::AiClaude => "claude",
            Self::AiGpt => "gpt",
            Self::AiOther => "ai",
            Self::System => "system",
            Self::Import => "import",
            Self::Unknown => "unknown",
        }
    }

    /// Interpret an environment source kind. Only `human`, `claude`, `gpt`
    /// and `system` are recognized (case-insensitive); anything else reads
    /// as `Human`.
    pub fn parse_kind(text: &str) -> Self {
        if text.eq_ignore_ascii_case("human") {
            Self::Human
        } else if text.eq_ignore_ascii_case("claude") {
            Self::AiClaude
        } else if text.eq_ignore_ascii_case("gpt") {
            Self::AiGpt
        } else if text.eq_ignore_ascii_case("system") {
            Self::System
        } else {
            Self::Human
        }
    }

    /// True for any of the AI variants.
    pub const fn is_ai(self) -> bool {
        matches!(self, Self::AiClaude | Self::AiGpt | Self::AiOther)
    }
}

impl fmt::Display for AttributionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Source masks
// ============================================================================

/// Bitset over [`AttributionSource`], used by filters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SourceMask(u32);

impl SourceMask {
    /// Every source, `Unknown` included.
    pub const ALL: SourceMask = SourceMask(u32::MAX);

    pub const fn empty() -> Self {
        SourceMask(0)
    }

    pub const fn only(source: AttributionSource) -> Self {
        SourceMask(source.bit())
    }

    /// All AI variants.
    pub const fn ai() -> Self {
        SourceMask(
            AttributionSource::AiClaude.bit()
                | AttributionSource::AiGpt.bit()
                | AttributionSource::AiOther.bit(),
        )
    }

    pub const fn with(self, source: AttributionSource) -> Self {
        SourceMask(self.0 | source.bit())
    }

    pub const fn contains(self, source: AttributionSource) -> bool {
        self.0 & source.bit() != 0
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn from_raw(raw: u32) -> Self {
        SourceMask(raw)
    }
}

impl Default for SourceMask {
    fn default() -> Self {
        SourceMask::ALL
    }
}

// ============================================================================
// Attribution records
// ============================================================================

/// Who created an edge, and in which session.
///
/// `flags` is a 32-bit field reserved for future use: the codec carries it
/// verbatim and nothing else interprets it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribution {
    pub source: AttributionSource,
    pub author: BoundedStr<AUTHOR_CAP>,
    pub session_id: BoundedStr<SESSION_CAP>,
    pub flags: u32,
}

impl Attribution {
    /// Default attribution for a source kind.
    pub fn for_source(source: AttributionSource) -> Self {
        let author = match source {
            AttributionSource::Human => "user@local",
            AttributionSource::AiClaude => "claude@anthropic",
            AttributionSource::AiGpt => "gpt@openai",
            AttributionSource::System => "system@graphmind",
            _ => "unknown@unknown",
        };
        Attribution {
            source,
            author: BoundedStr::truncate_from(author),
            session_id: BoundedStr::empty(),
            flags: 0,
        }
    }

    /// Resolve attribution from the injected environment.
    ///
    /// Reads [`ENV_SOURCE`], [`ENV_AUTHOR`] and [`ENV_SESSION`]. Missing
    /// variables fall back to the per-source defaults; oversized values are
    /// truncated, never rejected.
    pub fn from_environment(env: &dyn EnvSource) -> Self {
        let source = env
            .var(ENV_SOURCE)
            .map(|kind| AttributionSource::parse_kind(&kind))
            .unwrap_or(AttributionSource::Human);
        let mut attribution = Attribution::for_source(source);
        if let Some(author) = env.var(ENV_AUTHOR) {
            attribution.author = BoundedStr::truncate_from(&author);
        }
        if let Some(session) = env.var(ENV_SESSION) {
            attribution.session_id = BoundedStr::truncate_from(&session);
        }
        attribution
    }
}

impl Default for Attribution {
    fn default() -> Self {
        Attribution::for_source(AttributionSource::Human)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapEnv;

    #[test]
    fn defaults_table() {
        let cases = [
            (AttributionSource::Human, "user@local"),
            (AttributionSource::AiClaude, "claude@anthropic"),
            (AttributionSource::AiGpt, "gpt@openai"),
            (AttributionSource::System, "system@graphmind"),
            (AttributionSource::AiOther, "unknown@unknown"),
            (AttributionSource::Import, "unknown@unknown"),
            (AttributionSource::Unknown, "unknown@unknown"),
        ];
        for (source, author) in cases {
            let attribution = Attribution::for_source(source);
            assert_eq!(attribution.source, source);
            assert_eq!(attribution.author.as_str(), author);
            assert!(attribution.session_id.is_empty());
            assert_eq!(attribution.flags, 0);
        }
    }

    #[test]
    fn parse_kind_is_case_insensitive_and_defaults_to_human() {
        assert_eq!(
            AttributionSource::parse_kind("CLAUDE"),
            AttributionSource::AiClaude
        );
        assert_eq!(AttributionSource::parse_kind("Gpt"), AttributionSource::AiGpt);
        assert_eq!(
            AttributionSource::parse_kind("system"),
            AttributionSource::System
        );
        assert_eq!(AttributionSource::parse_kind("human"), AttributionSource::Human);
        // Unrecognized kinds read as human-authored.
        assert_eq!(AttributionSource::parse_kind("robot"), AttributionSource::Human);
        assert_eq!(AttributionSource::parse_kind(""), AttributionSource::Human);
        assert_eq!(AttributionSource::parse_kind("import"), AttributionSource::Human);
    }

    #[test]
    fn environment_full_override() {
        let env = MapEnv::new()
            .set(ENV_SOURCE, "claude")
            .set(ENV_AUTHOR, "claude@session-7")
            .set(ENV_SESSION, "sess-0042");
        let attribution = Attribution::from_environment(&env);
        assert_eq!(attribution.source, AttributionSource::AiClaude);
        assert_eq!(attribution.author.as_str(), "claude@session-7");
        assert_eq!(attribution.session_id.as_str(), "sess-0042");
    }

    #[test]
    fn environment_empty_falls_back_to_human_defaults() {
        let attribution = Attribution::from_environment(&MapEnv::new());
        assert_eq!(attribution.source, AttributionSource::Human);
        assert_eq!(attribution.author.as_str(), "user@local");
        assert!(attribution.session_id.is_empty());
    }

    #[test]
    fn environment_partial_override_keeps_defaults() {
        let env = MapEnv::new().set(ENV_SOURCE, "gpt");
        let attribution = Attribution::from_environment(&env);
        assert_eq!(attribution.source, AttributionSource::AiGpt);
        assert_eq!(attribution.author.as_str(), "gpt@openai");
    }

    #[test]
    fn environment_truncates_oversized_values() {
        let long_author = "a".repeat(200);
        let long_session = "s".repeat(100);
        let env = MapEnv::new()
            .set(ENV_AUTHOR, &long_author)
            .set(ENV_SESSION, &long_session);
        let attribution = Attribution::from_environment(&env);
        assert_eq!(attribution.author.len(), AUTHOR_CAP);
        assert_eq!(attribution.session_id.len(), SESSION_CAP);
    }

    #[test]
    fn source_mask_membership() {
        let mask = SourceMask::only(AttributionSource::Human);
        assert!(mask.contains(AttributionSource::Human));
        assert!(!mask.contains(AttributionSource::AiClaude));

        let both = mask.with(AttributionSource::System);
        assert!(both.contains(AttributionSource::System));

        assert!(SourceMask::ai().contains(AttributionSource::AiClaude));
        assert!(SourceMask::ai().contains(AttributionSource::AiGpt));
        assert!(SourceMask::ai().contains(AttributionSource::AiOther));
        assert!(!SourceMask::ai().contains(AttributionSource::Human));

        for source in [
            AttributionSource::Human,
            AttributionSource::AiClaude,
            AttributionSource::AiGpt,
            AttributionSource::AiOther,
            AttributionSource::System,
            AttributionSource::Import,
            AttributionSource::Unknown,
        ] {
            assert!(SourceMask::ALL.contains(source));
            assert!(!SourceMask::empty().contains(source));
        }
    }

    #[test]
    fn unknown_masks_via_low_bit() {
        // The sentinel wire value stays 255 but its mask bit is small.
        assert_eq!(AttributionSource::Unknown.wire_value(), 255);
        assert_eq!(AttributionSource::Unknown.bit(), 1 << 6);
    }

    #[test]
    fn wire_round_trip_is_strict() {
        for source in [
            AttributionSource::Human,
            AttributionSource::AiClaude,
            AttributionSource::AiGpt,
            AttributionSource::AiOther,
            AttributionSource::System,
            AttributionSource::Import,
            AttributionSource::Unknown,
        ] {
            assert_eq!(
                AttributionSource::from_wire(source.wire_value()),
                Some(source)
            );
        }
        assert_eq!(AttributionSource::from_wire(6), None);
        assert_eq!(AttributionSource::from_wire(254), None);
    }
}
