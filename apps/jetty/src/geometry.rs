//! Pure coordinate-space translation between the local display surface
//! and the remote viewport. No state; callers must pass a fresh
//! viewport snapshot on every event rather than one captured at setup
//! time, since the remote viewport can change between frames.

/// Remote viewport dimensions, taken from inbound frame headers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn aspect_ratio(self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            f64::from(self.width) / f64::from(self.height)
        }
    }
}

/// Position and size of the local capture surface, in local display
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// A pointer position translated into remote-viewport space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePoint {
    pub x: u32,
    pub y: u32,
}

/// Display size computed by [`fit_to_container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFit {
    pub width: u32,
    pub height: u32,
}

/// Map a local pointer position into remote-viewport space.
///
/// Scales by the live ratio of viewport to display rect, rounds, and
/// clamps each axis into `[0, dimension - 1]` so positions outside the
/// rect still land on the viewport edge. Degenerate rects (non-positive
/// width or height) clamp to the origin rather than dividing by zero.
pub fn map_to_remote(
    local_x: f64,
    local_y: f64,
    rect: DisplayRect,
    viewport: Viewport,
) -> RemotePoint {
    RemotePoint {
        x: map_axis(local_x - rect.left, rect.width, viewport.width),
        y: map_axis(local_y - rect.top, rect.height, viewport.height),
    }
}

fn map_axis(offset: f64, display_len: f64, remote_len: u32) -> u32 {
    if remote_len == 0 {
        return 0;
    }
    let max = remote_len - 1;
    if display_len <= 0.0 {
        return 0;
    }
    let scale = f64::from(remote_len) / display_len;
    let mapped = (offset * scale).round();
    if mapped.is_nan() || mapped <= 0.0 {
        0
    } else if mapped >= f64::from(max) {
        max
    } else {
        mapped as u32
    }
}

/// Compute the display size that fits the remote viewport's aspect
/// ratio inside a container, width-first with a height-first fallback.
///
/// `used_height` is vertical space already taken by surrounding chrome.
/// Returns `None` when the available space or the aspect ratio is
/// non-positive; callers skip the layout pass instead of producing
/// negative dimensions.
pub fn fit_to_container(
    container_width: f64,
    container_height: f64,
    used_height: f64,
    aspect_ratio: f64,
) -> Option<DisplayFit> {
    let available_height = container_height - used_height;
    if container_width <= 0.0 || available_height <= 0.0 || aspect_ratio <= 0.0 {
        return None;
    }

    let mut width = container_width;
    let mut height = width / aspect_ratio;
    if height > available_height {
        height = available_height;
        width = height * aspect_ratio;
    }

    Some(DisplayFit {
        width: width.round() as u32,
        height: height.round() as u32,
    })
}
