/// Scroll position of a console viewport, measured in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    offset: usize,
    viewport: usize,
    content: usize,
}

impl ViewState {
    pub fn new(viewport: usize) -> Self {
        Self {
            offset: 0,
            viewport,
            content: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn viewport(&self) -> usize {
        self.viewport
    }

    pub fn content(&self) -> usize {
        self.content
    }

    pub fn bottom_offset(&self) -> usize {
        self.content.saturating_sub(self.viewport)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.offset >= self.bottom_offset()
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.bottom_offset();
    }

    /// The user moved the viewport.
    pub fn user_scrolled(&mut self, offset: usize) {
        self.offset = offset.min(self.bottom_offset());
    }

    /// Growing content leaves the offset alone; shrinking content pulls it
    /// back into range.
    pub fn set_content(&mut self, content: usize) {
        self.content = content;
        self.offset = self.offset.min(self.bottom_offset());
    }

    pub fn set_viewport(&mut self, viewport: usize) {
        self.viewport = viewport;
        self.offset = self.offset.min(self.bottom_offset());
    }
}
