use std::io::Cursor;

use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};

pub fn enhance(png: &[u8]) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(png).map_err(|err| format!("decode page: {err}"))?;
    let mut gray = decoded.to_luma8();
    stretch_contrast(&mut gray);
    let sharpened = imageops::unsharpen(&gray, 1.0, 2);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(sharpened)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| format!("encode page: {err}"))?;
    Ok(out.into_inner())
}

fn stretch_contrast(image: &mut GrayImage) {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), Luma([v])| (lo.min(*v), hi.max(*v)));
    if max <= min {
        return;
    }
    let range = f32::from(max - min);
    for Luma([value]) in image.pixels_mut() {
        *value = ((f32::from(*value - min) / range) * 255.0).round() as u8;
    }
}
