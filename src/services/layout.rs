//! Page layout selection and placement math.
//!
//! Everything here is pure: a [`LayoutPolicy`] plus an image size in pixels
//! gives a [`PagePlacement`] in PDF points. One pixel is one point at the
//! image's native size.

use crate::models::{LayoutPolicy, PageMode};

const POINTS_PER_MM: f32 = 72.0 / 25.4;

/// A4 page size in points (210 x 297 mm).
pub const A4_SIZE_PT: (f32, f32) = (210.0 * POINTS_PER_MM, 297.0 * POINTS_PER_MM);

/// Map the page-mode setting to the policy handed to the assembler.
pub fn select_layout(mode: PageMode) -> LayoutPolicy {
    match mode {
        PageMode::Fit => LayoutPolicy::FitA4,
        PageMode::Shrink => LayoutPolicy::ShrinkA4,
        PageMode::Original => LayoutPolicy::Original,
    }
}

/// Where one image goes on its page. All values are in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    pub page_width: f32,
    pub page_height: f32,
    /// Lower-left corner of the image on the page.
    pub x: f32,
    pub y: f32,
    /// Factor applied to the native (1 px = 1 pt) image size.
    pub scale: f32,
    pub width: f32,
    pub height: f32,
}

impl LayoutPolicy {
    /// Compute the page and image rectangle for an image of `width` x `height` pixels.
    pub fn place(&self, width: u32, height: u32) -> PagePlacement {
        let (img_w, img_h) = (width as f32, height as f32);

        match self {
            LayoutPolicy::Original => PagePlacement {
                page_width: img_w,
                page_height: img_h,
                x: 0.0,
                y: 0.0,
                scale: 1.0,
                width: img_w,
                height: img_h,
            },
            LayoutPolicy::FitA4 => centered_on_a4(img_w, img_h, fit_scale(img_w, img_h)),
            LayoutPolicy::ShrinkA4 => {
                centered_on_a4(img_w, img_h, fit_scale(img_w, img_h).min(1.0))
            }
        }
    }
}

/// Largest scale that keeps the image inside an A4 page.
fn fit_scale(img_w: f32, img_h: f32) -> f32 {
    let (page_w, page_h) = A4_SIZE_PT;
    (page_w / img_w).min(page_h / img_h)
}

fn centered_on_a4(img_w: f32, img_h: f32, scale: f32) -> PagePlacement {
    let (page_w, page_h) = A4_SIZE_PT;
    let width = img_w * scale;
    let height = img_h * scale;

    PagePlacement {
        page_width: page_w,
        page_height: page_h,
        x: (page_w - width) / 2.0,
        y: (page_h - height) / 2.0,
        scale,
        width,
        height,
    }
}
