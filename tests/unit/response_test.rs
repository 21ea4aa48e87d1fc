//! Unit tests for response encoding

use dotcanvas_ai_service::response::{self, base64};
use image::{DynamicImage, Rgb, RgbImage};

#[test]
fn test_base64_decode_raw_and_data_url() {
    let encoded = base64::encode(b"Hello, World!");
    assert_eq!(base64::decode(&encoded).unwrap(), b"Hello, World!");

    let data_url = base64::create_data_url(b"Hello, World!", "image/png");
    assert_eq!(data_url, "data:image/png;base64,SGVsbG8sIFdvcmxkIQ==");
    assert_eq!(base64::decode(&data_url).unwrap(), b"Hello, World!");
}

#[test]
fn test_png_data_url_preserves_pixels() {
    let mut bitmap = RgbImage::new(3, 2);
    bitmap.put_pixel(1, 1, Rgb([200, 10, 30]));
    let image = DynamicImage::ImageRgb8(bitmap);

    let url = response::png_data_url(&image).unwrap();
    assert!(url.starts_with("data:image/png;base64,"));

    let decoded = image::load_from_memory(&base64::decode(&url).unwrap())
        .unwrap()
        .to_rgb8();
    assert_eq!(decoded.dimensions(), (3, 2));
    assert_eq!(decoded.get_pixel(1, 1), &Rgb([200, 10, 30]));
}

#[test]
fn test_png_data_urls_keeps_order() {
    let images = vec![
        DynamicImage::ImageRgb8(RgbImage::new(1, 1)),
        DynamicImage::ImageRgb8(RgbImage::new(2, 2)),
    ];

    let urls = response::png_data_urls(&images).unwrap();
    assert_eq!(urls.len(), 2);

    let second = image::load_from_memory(&base64::decode(&urls[1]).unwrap()).unwrap();
    assert_eq!(second.width(), 2);
}
