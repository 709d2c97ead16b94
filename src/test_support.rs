// src/test_support.rs
use crate::models::SelectedFile;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Encodes a small opaque PNG whose pixels come from `color`.
pub fn png_bytes(width: u32, height: u32, color: impl Fn(u32, u32) -> [u8; 3]) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b] = color(x, y);
        Rgba([r, g, b, 255])
    });

    let mut output = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .unwrap();
    output
}

pub fn selected(file_name: &str, declared_type: Option<&str>, data: Vec<u8>) -> SelectedFile {
    SelectedFile {
        file_name: file_name.to_string(),
        declared_type: declared_type.map(str::to_string),
        data: data.into(),
    }
}
