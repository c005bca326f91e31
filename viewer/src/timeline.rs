use iced::{
    mouse,
    widget::canvas::{self, Frame, Geometry, Path, Stroke},
    Color, Point, Rectangle, Renderer, Size, Theme,
};

/// Bar chart of boxes per sampled frame with a cursor on the shown frame.
#[derive(Clone)]
pub struct DetectionTimeline {
    counts: Vec<usize>,
    current: Option<usize>,
}

impl DetectionTimeline {
    pub fn new(counts: Vec<usize>, current: Option<usize>) -> Self {
        Self { counts, current }
    }

    /// Horizontal span of bar `index` within a canvas `width` wide.
    fn slot(&self, index: usize, width: f32) -> (f32, f32) {
        let step = width / self.counts.len().max(1) as f32;
        (index as f32 * step, step)
    }
}

impl<Message> canvas::Program<Message> for DetectionTimeline {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.05, 0.05, 0.05),
        );
        if self.counts.is_empty() {
            return vec![frame.into_geometry()];
        }

        let peak = self.counts.iter().copied().max().unwrap_or(0).max(1) as f32;
        for (index, count) in self.counts.iter().enumerate() {
            let (x, step) = self.slot(index, bounds.width);
            let height = (*count as f32 / peak) * (bounds.height - 6.0);
            let color = if Some(index) == self.current {
                Color::from_rgb(1.0, 0.2, 0.2)
            } else {
                Color::from_rgb(0.18, 0.72, 0.89)
            };
            frame.fill_rectangle(
                Point::new(x + 1.0, bounds.height - height),
                Size::new((step - 2.0).max(1.0), height),
                color,
            );
        }

        if let Some(current) = self.current {
            let (x, step) = self.slot(current, bounds.width);
            let center = x + step / 2.0;
            let cursor = Path::new(|builder| {
                builder.move_to(Point::new(center, 0.0));
                builder.line_to(Point::new(center, bounds.height));
            });
            frame.stroke(
                &cursor,
                Stroke::default()
                    .with_width(1.5)
                    .with_color(Color::from_rgb(0.95, 0.95, 0.95)),
            );
        }

        vec![frame.into_geometry()]
    }
}
