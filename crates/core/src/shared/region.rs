use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegionError {
    #[error("frame dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },
}

/// Axis-aligned rectangle in pixel coordinates.
///
/// Used for the region of interest as well as detected face boxes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The centered search area of a frame: quarter offset, half size.
    ///
    /// Integer division truncates, so `x + width <= frame_width` and
    /// `y + height <= frame_height` always hold.
    pub fn region_of_interest(frame_width: i64, frame_height: i64) -> Result<Self, RegionError> {
        let max = i32::MAX as i64;
        if frame_width <= 0 || frame_height <= 0 || frame_width > max || frame_height > max {
            return Err(RegionError::InvalidDimensions {
                width: frame_width,
                height: frame_height,
            });
        }
        let (w, h) = (frame_width as i32, frame_height as i32);
        Ok(Self::new(w / 4, h / 4, w / 2, h / 2))
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Shifts the region by `(dx, dy)`, e.g. from ROI-local to frame coordinates.
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersects the region with `[0, width) x [0, height)`.
    pub fn clip_to(&self, width: u32, height: u32) -> Self {
        let x1 = self.x.clamp(0, width as i32);
        let y1 = self.y.clamp(0, height as i32);
        let x2 = self.right().clamp(x1, width as i32);
        let y2 = self.bottom().clamp(y1, height as i32);
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// True when `self` lies within `outer` grown by `(dx, dy)` on every side.
    pub fn is_inside(&self, outer: &Region, dx: i32, dy: i32) -> bool {
        self.x >= outer.x - dx
            && self.y >= outer.y - dy
            && self.right() <= outer.right() + dx
            && self.bottom() <= outer.bottom() + dy
    }
}
