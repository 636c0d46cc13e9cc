//! Evidence state machine with validated transitions.
//!
//! Status only advances through
//! PENDING -> METADATA_EXTRACTED -> [FRAMES_EXTRACTED, video only] -> ANALYSIS_COMPLETE,
//! or drops to FAILED from any non-terminal state. Terminal states absorb.

use crate::error::TraceVaultError;
use crate::types::AnalysisStatus;

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Pending -> MetadataExtracted
/// - MetadataExtracted -> FramesExtracted (video evidence)
/// - MetadataExtracted -> AnalysisComplete (non-video evidence)
/// - FramesExtracted -> AnalysisComplete
/// - any non-terminal -> Failed
pub fn validate_transition(
    from: AnalysisStatus,
    to: AnalysisStatus,
) -> Result<(), TraceVaultError> {
    let valid = matches!(
        (from, to),
        (AnalysisStatus::Pending, AnalysisStatus::MetadataExtracted)
            | (
                AnalysisStatus::MetadataExtracted,
                AnalysisStatus::FramesExtracted
            )
            | (
                AnalysisStatus::MetadataExtracted,
                AnalysisStatus::AnalysisComplete
            )
            | (
                AnalysisStatus::FramesExtracted,
                AnalysisStatus::AnalysisComplete
            )
    ) || (!from.is_terminal() && to == AnalysisStatus::Failed);

    if valid {
        Ok(())
    } else {
        Err(TraceVaultError::InvalidTransition { from, to })
    }
}
