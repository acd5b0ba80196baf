use thiserror::Error;

pub mod frame;
pub mod pbm;

pub use frame::FrameBuffer;
pub use pbm::PbmDisplay;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("display not initialized")]
    NotInitialized,
    #[error("region {0:?} is outside the {1}x{2} panel")]
    RegionOutOfBounds(Rect, u32, u32),
    #[error("frame is {0}x{1}, panel is {2}x{3}")]
    SizeMismatch(u32, u32, u32, u32),
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x
            .checked_add(self.width)
            .map_or(false, |right| right <= width)
            && self
                .y
                .checked_add(self.height)
                .map_or(false, |bottom| bottom <= height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Full,
    Partial,
}

pub trait DisplayTransport {
    /// Whether the panel can be addressed yet.
    fn is_ready(&self) -> bool;

    /// Prepare the panel for a full refresh.
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Prepare the panel for partial refreshes.
    fn init_partial(&mut self) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;

    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError>;

    fn display_partial(&mut self, frame: &FrameBuffer, region: Rect) -> Result<(), DisplayError>;

    fn sleep(&mut self) -> Result<(), DisplayError>;

    /// Panel size in pixels.
    fn dimensions(&self) -> (u32, u32);
}

/// Clears the panel and puts it to sleep before the process exits.
pub fn shutdown<D: DisplayTransport + ?Sized>(display: &mut D) -> Result<(), DisplayError> {
    log::info!("clearing display and going to sleep");
    display.init()?;
    display.clear()?;
    display.sleep()
}
