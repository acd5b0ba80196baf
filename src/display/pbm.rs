use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::display::{DisplayError, DisplayTransport, FrameBuffer, Rect, RefreshMode};

const FRAME_FILE: &str = "frame.pbm";

/// Panel stand-in that mirrors what an e-paper panel would show into
/// `<dir>/frame.pbm`.
#[derive(Debug)]
pub struct PbmDisplay {
    dir: PathBuf,
    panel: FrameBuffer,
    mode: Option<RefreshMode>,
}

impl PbmDisplay {
    pub fn new(dir: PathBuf, width: u32, height: u32) -> Self {
        Self {
            dir,
            panel: FrameBuffer::new(width, height),
            mode: None,
        }
    }

    pub fn frame_path(&self) -> PathBuf {
        self.dir.join(FRAME_FILE)
    }

    fn check_frame(&self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        if self.mode.is_none() {
            return Err(DisplayError::NotInitialized);
        }
        if frame.width() != self.panel.width() || frame.height() != self.panel.height() {
            return Err(DisplayError::SizeMismatch(
                frame.width(),
                frame.height(),
                self.panel.width(),
                self.panel.height(),
            ));
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), DisplayError> {
        let target = self.frame_path();
        let temp = self.dir.join(format!("{}.tmp", FRAME_FILE));

        let written = fs::File::create(&temp)
            .and_then(|mut file| {
                file.write_all(&self.panel.to_pbm())?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp, &target));
        if let Err(err) = written {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }

        log::trace!("wrote {:?}", target);
        Ok(())
    }
}

impl DisplayTransport for PbmDisplay {
    fn is_ready(&self) -> bool {
        self.dir.is_dir()
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.mode = Some(RefreshMode::Full);
        Ok(())
    }

    fn init_partial(&mut self) -> Result<(), DisplayError> {
        self.mode = Some(RefreshMode::Partial);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        if self.mode.is_none() {
            return Err(DisplayError::NotInitialized);
        }
        self.panel = FrameBuffer::new(self.panel.width(), self.panel.height());
        self.flush()
    }

    fn display_full(&mut self, frame: &FrameBuffer) -> Result<(), DisplayError> {
        self.check_frame(frame)?;
        self.panel = frame.clone();
        self.flush()
    }

    fn display_partial(&mut self, frame: &FrameBuffer, region: Rect) -> Result<(), DisplayError> {
        self.check_frame(frame)?;
        if self.mode != Some(RefreshMode::Partial) {
            log::debug!("partial update without init_partial");
        }
        if !region.fits_within(self.panel.width(), self.panel.height()) {
            return Err(DisplayError::RegionOutOfBounds(
                region,
                self.panel.width(),
                self.panel.height(),
            ));
        }

        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let black = frame.pixel(x, y).unwrap_or(false);
                self.panel.set_pixel(x, y, black);
            }
        }
        self.flush()
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.mode = None;
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.panel.width(), self.panel.height())
    }
}
