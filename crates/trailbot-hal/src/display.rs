//! `MarkerSink` trait for 3-D diagnostic markers.
//!
//! Markers are read-only diagnostics.  Nothing published here feeds back into
//! control.

use trailbot_types::{FollowError, Marker};

pub trait MarkerSink: Send {
    /// Publish one frame's worth of markers, replacing the previous frame.
    ///
    /// # Errors
    ///
    /// Returns [`FollowError::Actuation`] if the display is unreachable.
    fn publish_markers(&mut self, markers: &[Marker]) -> Result<(), FollowError>;
}

impl<M: MarkerSink + ?Sized> MarkerSink for Box<M> {
    fn publish_markers(&mut self, markers: &[Marker]) -> Result<(), FollowError> {
        (**self).publish_markers(markers)
    }
}

/// Sink that drops every marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMarkerSink;

impl MarkerSink for NullMarkerSink {
    fn publish_markers(&mut self, _markers: &[Marker]) -> Result<(), FollowError> {
        Ok(())
    }
}
