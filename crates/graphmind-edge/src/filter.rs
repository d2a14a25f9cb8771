//! Provenance filters.
//!
//! A filter is the conjunction of three clauses: a source mask, an inclusive
//! confidence range, and an optional lane. Filters are built per query and
//! never mutated afterwards; the cache layer hashes [`Filter::key_material`]
//! to fingerprint them.

use crate::attribution::{AttributionSource, SourceMask};
use crate::edge::AttributedEdge;
use crate::{Confidence, Lane};

/// Edge selection predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    sources: SourceMask,
    confidence_min: Confidence,
    confidence_max: Confidence,
    lane: Option<Lane>,
}

impl Filter {
    /// Match everything.
    pub fn any() -> Self {
        Filter {
            sources: SourceMask::ALL,
            confidence_min: Confidence::ZERO,
            confidence_max: Confidence::FULL,
            lane: None,
        }
    }

    /// Human-authored edges only, any confidence.
    pub fn human_only() -> Self {
        Filter {
            sources: SourceMask::only(AttributionSource::Human),
            ..Filter::any()
        }
    }

    /// AI-authored edges at or above `min` confidence. The threshold is
    /// clamped and quantized exactly like edge confidence, so equality at
    /// the threshold is inclusive.
    pub fn ai_insights(min: f32) -> Self {
        Filter {
            sources: SourceMask::ai(),
            confidence_min: Confidence::new(min),
            ..Filter::any()
        }
    }

    /// Restrict to a single lane.
    pub fn with_lane(mut self, lane: Lane) -> Self {
        self.lane = Some(lane);
        self
    }

    /// Replace the source mask.
    pub fn with_sources(mut self, sources: SourceMask) -> Self {
        self.sources = sources;
        self
    }

    /// Replace the inclusive confidence range.
    pub fn with_confidence(mut self, min: Confidence, max: Confidence) -> Self {
        self.confidence_min = min;
        self.confidence_max = max;
        self
    }

    pub fn sources(&self) -> SourceMask {
        self.sources
    }

    pub fn confidence_min(&self) -> Confidence {
        self.confidence_min
    }

    pub fn confidence_max(&self) -> Confidence {
        self.confidence_max
    }

    pub fn lane(&self) -> Option<Lane> {
        self.lane
    }

    /// The three-clause conjunction. Both confidence ends are inclusive.
    pub fn matches(&self, edge: &AttributedEdge) -> bool {
        if !self.sources.contains(edge.attribution.source) {
            return false;
        }
        if edge.confidence < self.confidence_min || edge.confidence > self.confidence_max {
            return false;
        }
        match self.lane {
            Some(lane) => lane == edge.lane,
            None => true,
        }
    }

    /// Stable byte encoding for cache fingerprints. Layout, little endian:
    /// mask u32, min bits u16, max bits u16, lane presence u8, lane wire
    /// value u8. Equal filters produce identical bytes.
    pub fn key_material(&self) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[0..4].copy_from_slice(&self.sources.raw().to_le_bytes());
        out[4..6].copy_from_slice(&self.confidence_min.bits().to_le_bytes());
        out[6..8].copy_from_slice(&self.confidence_max.bits().to_le_bytes());
        if let Some(lane) = self.lane {
            out[8] = 1;
            out[9] = lane.wire_value();
        }
        out
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::Attribution;
    use crate::context::EdgeContext;
    use crate::{ObjectId, RelationKind};

    fn edge_with(source: AttributionSource, confidence: f32, lane: Lane) -> AttributedEdge {
        let ctx = EdgeContext::deterministic(1_000, 1, Default::default());
        AttributedEdge::create(
            &ctx,
            ObjectId::from_bytes([0xAA; 20]),
            "src/core.rs",
            ObjectId::from_bytes([0xBB; 20]),
            "docs/core.md",
            RelationKind::References,
            Confidence::new(confidence),
            lane,
            Attribution::for_source(source),
        )
    }

    #[test]
    fn any_matches_everything() {
        let filter = Filter::any();
        assert!(filter.matches(&edge_with(AttributionSource::Human, 0.0, Lane::Default)));
        assert!(filter.matches(&edge_with(AttributionSource::Unknown, 1.0, Lane::Custom)));
        assert!(filter.matches(&edge_with(AttributionSource::AiClaude, 0.5, Lane::Testing)));
    }

    #[test]
    fn human_only_excludes_ai() {
        let filter = Filter::human_only();
        assert!(filter.matches(&edge_with(AttributionSource::Human, 0.9, Lane::Default)));
        assert!(!filter.matches(&edge_with(AttributionSource::AiClaude, 0.9, Lane::Default)));
        assert!(!filter.matches(&edge_with(AttributionSource::System, 0.9, Lane::Default)));
    }

    #[test]
    fn ai_insights_threshold_is_inclusive() {
        let filter = Filter::ai_insights(0.8);
        assert!(filter.matches(&edge_with(AttributionSource::AiClaude, 1.0, Lane::Default)));
        assert!(filter.matches(&edge_with(AttributionSource::AiClaude, 0.9, Lane::Default)));
        // Exactly at the (quantized) threshold.
        assert!(filter.matches(&edge_with(AttributionSource::AiGpt, 0.8, Lane::Default)));
        assert!(!filter.matches(&edge_with(AttributionSource::AiClaude, 0.5, Lane::Default)));
        // Right source, confidence below threshold.
        assert!(!filter.matches(&edge_with(AttributionSource::AiClaude, 0.79, Lane::Default)));
        // Humans are not insights.
        assert!(!filter.matches(&edge_with(AttributionSource::Human, 0.99, Lane::Default)));
    }

    #[test]
    fn confidence_range_is_inclusive_both_ends() {
        let filter = Filter::any()
            .with_confidence(Confidence::new(0.25), Confidence::new(0.75));
        assert!(filter.matches(&edge_with(AttributionSource::Human, 0.25, Lane::Default)));
        assert!(filter.matches(&edge_with(AttributionSource::Human, 0.5, Lane::Default)));
        assert!(filter.matches(&edge_with(AttributionSource::Human, 0.75, Lane::Default)));
        assert!(!filter.matches(&edge_with(AttributionSource::Human, 0.2, Lane::Default)));
        assert!(!filter.matches(&edge_with(AttributionSource::Human, 0.8, Lane::Default)));
    }

    #[test]
    fn lane_clause_is_optional() {
        let scoped = Filter::any().with_lane(Lane::Architecture);
        assert!(scoped.matches(&edge_with(AttributionSource::Human, 0.5, Lane::Architecture)));
        assert!(!scoped.matches(&edge_with(AttributionSource::Human, 0.5, Lane::Testing)));
        // Default lane is an ordinary lane, not a wildcard.
        let default_only = Filter::any().with_lane(Lane::Default);
        assert!(default_only.matches(&edge_with(AttributionSource::Human, 0.5, Lane::Default)));
        assert!(!default_only.matches(&edge_with(AttributionSource::Human, 0.5, Lane::Analysis)));
    }

    #[test]
    fn empty_mask_matches_nothing() {
        let filter = Filter::any().with_sources(SourceMask::empty());
        assert!(!filter.matches(&edge_with(AttributionSource::Human, 1.0, Lane::Default)));
        assert!(!filter.matches(&edge_with(AttributionSource::Unknown, 1.0, Lane::Default)));
    }

    #[test]
    fn key_material_tracks_each_clause() {
        let base = Filter::any();
        assert_eq!(base.key_material(), Filter::any().key_material());
        assert_ne!(base.key_material(), Filter::human_only().key_material());
        assert_ne!(base.key_material(), Filter::ai_insights(0.5).key_material());
        assert_ne!(
            base.key_material(),
            Filter::any().with_lane(Lane::Default).key_material()
        );
        assert_ne!(
            Filter::any().with_lane(Lane::Default).key_material(),
            Filter::any().with_lane(Lane::Testing).key_material()
        );
        assert_ne!(
            Filter::ai_insights(0.5).key_material(),
            Filter::ai_insights(0.6).key_material()
        );
    }
}
