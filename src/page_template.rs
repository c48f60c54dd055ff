use crate::frame::Frame;
use crate::types::{Rect, Size};

#[derive(Clone, Copy)]
pub struct FrameSpec {
    pub rect: Rect,
}

/// Page geometry for one template in the pagination sequence.
#[derive(Clone)]
pub struct PageTemplate {
    pub name: String,
    pub page_size: Size,
    frames: Vec<FrameSpec>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size) -> Self {
        Self {
            name: name.into(),
            page_size,
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, rect: Rect) -> Self {
        self.frames.push(FrameSpec { rect });
        self
    }

    pub fn instantiate_frames(&self) -> Vec<Frame> {
        self.frames
            .iter()
            .map(|spec| Frame::new(spec.rect))
            .collect()
    }
}
