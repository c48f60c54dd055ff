use crate::canvas::Canvas;
use crate::flowable::{BreakInside, Flowable};
use crate::types::{Pt, Rect};

pub enum AddResult {
    Placed,
    Split(Box<dyn Flowable>),
    Overflow(Box<dyn Flowable>),
}

pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    /// Distance from the top of the page to the current cursor.
    pub fn used_height(&self) -> Pt {
        self.rect.y + self.cursor_y
    }

    /// Pulls the cursor back, overlapping the next placement with the tail
    /// of the previous one.
    pub fn retreat(&mut self, amount: Pt) {
        self.cursor_y = (self.cursor_y - amount).max(Pt::ZERO);
    }

    pub fn add(&mut self, flowable: Box<dyn Flowable>, canvas: &mut Canvas) -> AddResult {
        let avail_width = self.rect.width;
        let avail_height = self.remaining_height();
        if avail_height <= Pt::ZERO {
            return AddResult::Overflow(flowable);
        }

        let pagination = flowable.pagination();
        let size = flowable.wrap(avail_width, avail_height);
        if matches!(pagination.break_inside, BreakInside::Avoid)
            && size.height > avail_height
            && size.height <= self.rect.height
            && !self.is_empty()
        {
            return AddResult::Overflow(flowable);
        }

        if size.height <= avail_height {
            flowable.draw(
                canvas,
                self.rect.x,
                self.rect.y + self.cursor_y,
                avail_width,
                avail_height,
            );
            self.cursor_y = self.cursor_y + size.height;
            return AddResult::Placed;
        }

        if let Some((first, second)) = flowable.split(avail_width, avail_height) {
            let first_size = first.wrap(avail_width, avail_height);
            if first_size.height > Pt::ZERO && first_size.height <= avail_height {
                first.draw(
                    canvas,
                    self.rect.x,
                    self.rect.y + self.cursor_y,
                    avail_width,
                    avail_height,
                );
                self.cursor_y = self.cursor_y + first_size.height;
                return AddResult::Split(second);
            }
        }

        // An unsplittable flowable taller than a whole page still lands on an
        // empty page instead of failing pagination outright.
        if self.is_empty() {
            flowable.draw(
                canvas,
                self.rect.x,
                self.rect.y + self.cursor_y,
                avail_width,
                avail_height,
            );
            self.cursor_y = self.rect.height;
            return AddResult::Placed;
        }

        AddResult::Overflow(flowable)
    }
}
