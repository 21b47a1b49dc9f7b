//! Recorded artifacts and the session manifest

use chrono::{DateTime, Utc};
use liveness::ChallengeDirection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Chunk;

fn byte_len(chunks: &[Chunk]) -> usize {
    chunks.iter().map(Chunk::len).sum()
}

/// A segment recorded to its target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentArtifact {
    pub session_id: Uuid,
    pub segment: usize,
    /// First second covered by these chunks (non-zero after a resume)
    pub start_second: u32,
    pub end_second: u32,
    pub chunks: Vec<Chunk>,
    pub created_at: DateTime<Utc>,
}

impl SegmentArtifact {
    pub fn new(session_id: Uuid, segment: usize, start_second: u32, end_second: u32, chunks: Vec<Chunk>) -> Self {
        Self {
            session_id,
            segment,
            start_second,
            end_second,
            chunks,
            created_at: Utc::now(),
        }
    }

    pub fn byte_len(&self) -> usize {
        byte_len(&self.chunks)
    }
}

/// Chunks from an interrupted segment recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialArtifact {
    pub session_id: Uuid,
    pub segment: usize,
    pub start_second: u32,
    pub end_second: u32,
    pub chunks: Vec<Chunk>,
    pub created_at: DateTime<Utc>,
}

impl PartialArtifact {
    pub fn new(session_id: Uuid, segment: usize, start_second: u32, end_second: u32, chunks: Vec<Chunk>) -> Self {
        Self {
            session_id,
            segment,
            start_second,
            end_second,
            chunks,
            created_at: Utc::now(),
        }
    }

    pub fn duration(&self) -> u32 {
        self.end_second.saturating_sub(self.start_second)
    }

    pub fn byte_len(&self) -> usize {
        byte_len(&self.chunks)
    }
}

/// Short clip of a confirmed challenge movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeClip {
    pub session_id: Uuid,
    /// Segment the verification followed
    pub segment: usize,
    pub direction: ChallengeDirection,
    pub attempt: u32,
    pub chunks: Vec<Chunk>,
    pub created_at: DateTime<Utc>,
}

impl ChallengeClip {
    pub fn new(
        session_id: Uuid,
        segment: usize,
        direction: ChallengeDirection,
        attempt: u32,
        chunks: Vec<Chunk>,
    ) -> Self {
        Self {
            session_id,
            segment,
            direction,
            attempt,
            chunks,
            created_at: Utc::now(),
        }
    }

    pub fn byte_len(&self) -> usize {
        byte_len(&self.chunks)
    }
}

/// Everything produced by a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub session_id: Uuid,
    pub segments: Vec<SegmentArtifact>,
    pub partials: Vec<PartialArtifact>,
    pub clips: Vec<ChallengeClip>,
    pub completed_at: DateTime<Utc>,
}

/// Kind of a manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Segment,
    Partial,
    Challenge,
}

/// Metadata for one artifact, without media bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: ArtifactKind,
    pub segment: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_second: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_second: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<ChallengeDirection>,
    pub byte_len: usize,
    pub created_at: DateTime<Utc>,
}

/// Serializable description of a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub total_bytes: usize,
    pub entries: Vec<ManifestEntry>,
}

impl ArtifactBundle {
    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(SegmentArtifact::byte_len).sum::<usize>()
            + self.partials.iter().map(PartialArtifact::byte_len).sum::<usize>()
            + self.clips.iter().map(ChallengeClip::byte_len).sum::<usize>()
    }

    /// Manifest with segments first, then partials, then clips
    pub fn manifest(&self) -> ArtifactManifest {
        let segments = self.segments.iter().map(|a| ManifestEntry {
            kind: ArtifactKind::Segment,
            segment: a.segment,
            start_second: Some(a.start_second),
            end_second: Some(a.end_second),
            direction: None,
            byte_len: a.byte_len(),
            created_at: a.created_at,
        });
        let partials = self.partials.iter().map(|a| ManifestEntry {
            kind: ArtifactKind::Partial,
            segment: a.segment,
            start_second: Some(a.start_second),
            end_second: Some(a.end_second),
            direction: None,
            byte_len: a.byte_len(),
            created_at: a.created_at,
        });
        let clips = self.clips.iter().map(|c| ManifestEntry {
            kind: ArtifactKind::Challenge,
            segment: c.segment,
            start_second: None,
            end_second: None,
            direction: Some(c.direction),
            byte_len: c.byte_len(),
            created_at: c.created_at,
        });

        ArtifactManifest {
            session_id: self.session_id,
            completed_at: self.completed_at,
            total_bytes: self.total_bytes(),
            entries: segments.chain(partials).chain(clips).collect(),
        }
    }

    pub fn manifest_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.manifest())
    }
}
