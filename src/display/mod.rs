#[cfg(feature = "sdl-display")]
pub mod display;
pub mod headless;

use color_eyre::Result;

#[cfg(feature = "sdl-display")]
pub use display::Sdl2Display;
pub use headless::HeadlessDisplay;

/// Byte layout of a [`DisplayImage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Gray8,
    Bgr24,
}

impl Layout {
    pub fn channels(self) -> usize {
        match self {
            Layout::Gray8 => 1,
            Layout::Bgr24 => 3,
        }
    }
}

/// Display-ready image: tightly packed rows, 8 bits per channel
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayImage {
    pub width: u32,
    pub height: u32,
    pub layout: Layout,
    pub data: Vec<u8>,
}

impl DisplayImage {
    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            layout: Layout::Gray8,
            data,
        }
    }

    pub fn bgr(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            layout: Layout::Bgr24,
            data,
        }
    }

    /// Row stride in bytes
    pub fn pitch(&self) -> usize {
        self.width as usize * self.layout.channels()
    }

    /// Interleaved BGR copy, expanding grayscale.
    pub fn to_bgr(&self) -> Vec<u8> {
        match self.layout {
            Layout::Bgr24 => self.data.clone(),
            Layout::Gray8 => self.data.iter().flat_map(|&g| [g, g, g]).collect(),
        }
    }

    /// Interleaved RGB copy, expanding grayscale.
    pub fn to_rgb(&self) -> Vec<u8> {
        match self.layout {
            Layout::Bgr24 => self
                .data
                .chunks_exact(3)
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect(),
            Layout::Gray8 => self.to_bgr(),
        }
    }
}

/// Where processed frames end up, and where key presses come from.
pub trait DisplaySurface {
    /// Render `image` in the window named after `stream`.
    fn show(&mut self, stream: &str, image: &DisplayImage) -> Result<()>;

    /// Non-blocking read of at most one key press.
    fn poll_key(&mut self) -> Result<Option<char>>;
}

impl<T: DisplaySurface + ?Sized> DisplaySurface for Box<T> {
    fn show(&mut self, stream: &str, image: &DisplayImage) -> Result<()> {
        (**self).show(stream, image)
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        (**self).poll_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_to_rgb_swaps_channels() {
        let img = DisplayImage::bgr(1, 1, vec![1, 2, 3]);
        assert_eq!(img.to_rgb(), vec![3, 2, 1]);
        assert_eq!(img.pitch(), 3);
    }

    #[test]
    fn gray_expands_to_three_channels() {
        let img = DisplayImage::gray(2, 1, vec![7, 9]);
        assert_eq!(img.to_bgr(), vec![7, 7, 7, 9, 9, 9]);
    }
}
