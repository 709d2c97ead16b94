// src/services/color_sampler.rs
use crate::models::{ColorRole, ColorSample, Palette, PickRequest};
use image::RgbaImage;
use log::debug;
use std::collections::BTreeMap;

/// Formats 8-bit channels as `#rrggbb`.
pub fn rgb_to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Maps a click on the rendered element into the image's natural pixel grid.
///
/// Without a rendered size the coordinate is taken as-is. Returns `None` for
/// points that land outside the image.
pub fn map_to_natural(pick: &PickRequest, natural: (u32, u32)) -> Option<(u32, u32)> {
    let (natural_width, natural_height) = natural;
    let x = scale_axis(pick.x, pick.rendered_width, natural_width)?;
    let y = scale_axis(pick.y, pick.rendered_height, natural_height)?;
    Some((x, y))
}

fn scale_axis(position: f64, rendered: Option<f64>, natural: u32) -> Option<u32> {
    let scaled = match rendered {
        Some(rendered) if rendered > 0.0 && rendered.is_finite() => {
            position * f64::from(natural) / rendered
        }
        _ => position,
    };

    if !scaled.is_finite() || scaled < 0.0 {
        return None;
    }
    let pixel = scaled.floor();
    if pixel >= f64::from(natural) {
        return None;
    }
    Some(pixel as u32)
}

/// Manual color picking: arm a role, then click the image.
#[derive(Debug, Clone, Default)]
pub struct ColorSampler {
    armed: Option<ColorRole>,
    samples: BTreeMap<ColorRole, String>,
}

impl ColorSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_role(&mut self, role: ColorRole) {
        self.armed = Some(role);
    }

    pub fn armed(&self) -> Option<ColorRole> {
        self.armed
    }

    /// Samples the pixel under `pick` for the armed role.
    ///
    /// No-op (returns `None`) when nothing is armed, there is no decoded
    /// image, or the point falls outside it; in the last case the role stays
    /// armed for the next click.
    pub fn sample_at(&mut self, raster: Option<&RgbaImage>, pick: &PickRequest) -> Option<ColorSample> {
        let Some(role) = self.armed else {
            debug!("Pick at ({}, {}) ignored, no role selected", pick.x, pick.y);
            return None;
        };
        let Some(raster) = raster else {
            debug!("Pick for {} ignored, no decoded image", role);
            return None;
        };
        let Some((x, y)) = map_to_natural(pick, raster.dimensions()) else {
            debug!("Pick at ({}, {}) is outside the image", pick.x, pick.y);
            return None;
        };

        let [r, g, b, _] = raster.get_pixel(x, y).0;
        let hex = rgb_to_hex(r, g, b);

        self.samples.insert(role, hex.clone());
        self.armed = None;

        Some(ColorSample { role, hex })
    }

    pub fn sample(&self, role: ColorRole) -> Option<&str> {
        self.samples.get(&role).map(String::as_str)
    }

    pub fn samples(&self) -> Vec<ColorSample> {
        self.samples
            .iter()
            .map(|(role, hex)| ColorSample {
                role: *role,
                hex: hex.clone(),
            })
            .collect()
    }

    pub fn missing_roles(&self) -> Vec<ColorRole> {
        ColorRole::ALL
            .into_iter()
            .filter(|role| !self.samples.contains_key(role))
            .collect()
    }

    pub fn palette_ready(&self) -> bool {
        self.missing_roles().is_empty()
    }

    pub fn palette(&self) -> Option<Palette> {
        Some(Palette {
            skin: self.sample(ColorRole::Skin)?.to_string(),
            hair: self.sample(ColorRole::Hair)?.to_string(),
            eye: self.sample(ColorRole::Eye)?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn pick(x: f64, y: f64) -> PickRequest {
        PickRequest {
            x,
            y,
            rendered_width: None,
            rendered_height: None,
        }
    }

    /// 4x2 image, each pixel colored by its position.
    fn raster() -> RgbaImage {
        RgbaImage::from_fn(4, 2, |x, y| Rgba([x as u8 * 60, y as u8 * 200, 5, 128]))
    }

    #[test]
    fn hex_is_zero_padded_in_rgb_order() {
        assert_eq!(rgb_to_hex(0, 0, 0), "#000000");
        assert_eq!(rgb_to_hex(255, 255, 255), "#ffffff");
        assert_eq!(rgb_to_hex(1, 2, 3), "#010203");
        assert_eq!(rgb_to_hex(16, 15, 171), "#100fab");
    }

    #[test]
    fn unarmed_pick_never_produces_a_sample() {
        let img = raster();
        let mut sampler = ColorSampler::new();
        for _ in 0..5 {
            assert_eq!(sampler.sample_at(Some(&img), &pick(1.0, 1.0)), None);
        }
        assert!(sampler.samples().is_empty());
    }

    #[test]
    fn pick_disarms_and_ignores_alpha() {
        let img = raster();
        let mut sampler = ColorSampler::new();
        sampler.select_role(ColorRole::Skin);

        let sample = sampler.sample_at(Some(&img), &pick(2.0, 1.0)).unwrap();
        assert_eq!(
            sample,
            ColorSample {
                role: ColorRole::Skin,
                hex: "#78c805".to_string()
            }
        );
        assert_eq!(sampler.armed(), None);
        assert_eq!(sampler.sample_at(Some(&img), &pick(0.0, 0.0)), None);
        assert_eq!(sampler.sample(ColorRole::Skin), Some("#78c805"));
    }

    #[test]
    fn later_role_leaves_earlier_sample_alone() {
        let img = raster();
        let mut sampler = ColorSampler::new();

        sampler.select_role(ColorRole::Skin);
        sampler.sample_at(Some(&img), &pick(0.0, 0.0));
        sampler.select_role(ColorRole::Hair);
        sampler.sample_at(Some(&img), &pick(3.0, 1.0));

        assert_eq!(sampler.sample(ColorRole::Skin), Some("#000005"));
        assert_eq!(sampler.sample(ColorRole::Hair), Some("#b4c805"));
    }

    #[test]
    fn same_role_is_overwritten() {
        let img = raster();
        let mut sampler = ColorSampler::new();
        sampler.select_role(ColorRole::Eye);
        sampler.sample_at(Some(&img), &pick(0.0, 0.0));
        sampler.select_role(ColorRole::Eye);
        sampler.sample_at(Some(&img), &pick(1.0, 0.0));

        assert_eq!(sampler.samples().len(), 1);
        assert_eq!(sampler.sample(ColorRole::Eye), Some("#3c0005"));
    }

    #[test]
    fn palette_ready_exactly_on_third_role() {
        let img = raster();
        let mut sampler = ColorSampler::new();

        sampler.select_role(ColorRole::Skin);
        sampler.sample_at(Some(&img), &pick(0.0, 0.0));
        assert!(!sampler.palette_ready());
        sampler.select_role(ColorRole::Skin);
        sampler.sample_at(Some(&img), &pick(1.0, 0.0));
        assert!(!sampler.palette_ready());
        sampler.select_role(ColorRole::Hair);
        sampler.sample_at(Some(&img), &pick(2.0, 0.0));
        assert!(!sampler.palette_ready());
        assert_eq!(sampler.palette(), None);
        assert_eq!(sampler.missing_roles(), vec![ColorRole::Eye]);

        sampler.select_role(ColorRole::Eye);
        sampler.sample_at(Some(&img), &pick(3.0, 1.0));
        assert!(sampler.palette_ready());
        assert_eq!(
            sampler.palette(),
            Some(Palette {
                skin: "#3c0005".to_string(),
                hair: "#780005".to_string(),
                eye: "#b4c805".to_string(),
            })
        );
    }

    #[test]
    fn rendered_coordinates_are_scaled_to_natural_grid() {
        let img = raster();
        let mut sampler = ColorSampler::new();
        sampler.select_role(ColorRole::Hair);

        // Rendered at 2x: (6.5, 3.9) on screen is natural (3, 1).
        let scaled = PickRequest {
            x: 6.5,
            y: 3.9,
            rendered_width: Some(8.0),
            rendered_height: Some(4.0),
        };
        let sample = sampler.sample_at(Some(&img), &scaled).unwrap();
        assert_eq!(sample.hex, "#b4c805");
    }

    #[test]
    fn outside_points_keep_role_armed() {
        let img = raster();
        let mut sampler = ColorSampler::new();
        sampler.select_role(ColorRole::Skin);

        assert_eq!(sampler.sample_at(Some(&img), &pick(4.0, 0.0)), None);
        assert_eq!(sampler.sample_at(Some(&img), &pick(-0.5, 0.0)), None);
        assert_eq!(sampler.sample_at(Some(&img), &pick(f64::NAN, 0.0)), None);
        assert_eq!(sampler.armed(), Some(ColorRole::Skin));
    }

    #[test]
    fn pick_without_image_is_noop() {
        let mut sampler = ColorSampler::new();
        sampler.select_role(ColorRole::Eye);
        assert_eq!(sampler.sample_at(None, &pick(0.0, 0.0)), None);
        assert_eq!(sampler.armed(), Some(ColorRole::Eye));
    }

    #[test]
    fn map_to_natural_without_rendered_size_is_identity() {
        assert_eq!(map_to_natural(&pick(2.9, 0.1), (4, 2)), Some((2, 0)));
        assert_eq!(map_to_natural(&pick(0.0, 2.0), (4, 2)), None);
    }
}
