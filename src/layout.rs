//! Button group layout.
//!
//! Pure functions from group parameters to button rectangles. The results
//! are relative to the group's own top-left corner; the caller translates
//! them once the group is placed.

use crate::element::{ButtonGroupLayout, Stagger};
use crate::geometry::{Rect, Size};

/// Pixel-resolved inputs of one group layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupMetrics {
    pub button_count: usize,
    pub row_size: u8,
    pub button_px: i32,
    pub spacing_px: i32,
    pub stagger: Stagger,
    pub x_padding: u8,
    pub y_padding: u8,
}

impl GroupMetrics {
    pub fn for_button_group(
        layout: &ButtonGroupLayout,
        button_count: usize,
        button_px: i32,
        spacing_px: i32,
    ) -> Self {
        Self {
            button_count,
            row_size: layout.row_size,
            button_px,
            spacing_px,
            stagger: layout.stagger,
            x_padding: layout.x_padding,
            y_padding: layout.y_padding,
        }
    }

    /// UI groups pack buttons edge to edge with no stagger or padding.
    pub fn for_ui_group(row_size: u8, button_count: usize, button_px: i32) -> Self {
        Self {
            button_count,
            row_size,
            button_px,
            spacing_px: 0,
            stagger: Stagger::None,
            x_padding: 0,
            y_padding: 0,
        }
    }

    fn pitch(&self) -> i32 {
        self.button_px + self.spacing_px
    }
}

/// Computed rectangles of one group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupLayout {
    /// Bounding size of all drawn rectangles
    pub size: Size,
    pub buttons: Vec<ButtonRects>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonRects {
    pub bounds: Rect,
    pub extended_bounds: Rect,
}

/// Offset of the button at `column` of `row`, before normalization.
fn stagger_offset(metrics: &GroupMetrics, row: i32, column: i32) -> (i32, i32) {
    if metrics.row_size <= 1 {
        return (0, 0);
    }
    match metrics.stagger.vertical_factor() {
        Some(factor) => {
            let dy = (f64::from(metrics.button_px) * factor * f64::from(column)).round() as i32;
            (0, dy)
        }
        None => {
            let pitch = metrics.pitch();
            (-pitch * row, pitch * column)
        }
    }
}

/// Lay out a group's buttons in rows of `row_size`, in insertion order.
pub fn layout_group(metrics: &GroupMetrics) -> GroupLayout {
    if metrics.button_count == 0 {
        return GroupLayout::default();
    }

    let row_size = usize::from(metrics.row_size.max(1));
    let pitch = metrics.pitch();
    let size = Size::square(metrics.button_px);

    let mut rects: Vec<Rect> = (0..metrics.button_count)
        .map(|i| {
            let row = (i / row_size) as i32;
            let column = (i % row_size) as i32;
            let (dx, dy) = stagger_offset(metrics, row, column);
            Rect::new(column * pitch + dx, row * pitch + dy, size.width, size.height)
        })
        .collect();

    let min_x = rects.iter().map(|r| r.x).min().unwrap_or(0);
    let min_y = rects.iter().map(|r| r.y).min().unwrap_or(0);
    let mut bounding = Rect::default();
    for rect in rects.iter_mut() {
        *rect = rect.translate(-min_x, -min_y);
        bounding = bounding.union(rect);
    }

    let pad_x = metrics.button_px * i32::from(metrics.x_padding) / 100;
    let pad_y = metrics.button_px * i32::from(metrics.y_padding) / 100;

    GroupLayout {
        size: bounding.size(),
        buttons: rects
            .into_iter()
            .map(|bounds| ButtonRects {
                bounds,
                extended_bounds: bounds.expand(pad_x, pad_y),
            })
            .collect(),
    }
}
