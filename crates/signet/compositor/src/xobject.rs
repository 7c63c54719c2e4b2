//! Image XObject embedding.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::{ImageEncoding, RenderError, RenderResult, StampImage};

/// Decode an uploaded image under its declared encoding and embed it as an
/// RGB XObject. An alpha channel is carried as a soft mask so transparent
/// signature backgrounds stay transparent.
pub(crate) fn embed(doc: &mut Document, stamp: &StampImage) -> RenderResult<ObjectId> {
    let format = match stamp.encoding {
        ImageEncoding::Png => image::ImageFormat::Png,
        ImageEncoding::Jpeg => image::ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(&stamp.bytes, format)
        .map_err(|e| RenderError::Decode(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let pixel_count = (width as usize) * (height as usize);
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    let mut opaque = true;
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
        opaque &= pixel.0[3] == u8::MAX;
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if !opaque {
        let mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        );
        let mask_id = doc.add_object(mask);
        dict.set("SMask", Object::Reference(mask_id));
    }
    Ok(doc.add_object(Stream::new(dict, rgb)))
}
