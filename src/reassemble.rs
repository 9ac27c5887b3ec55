use image::RgbaImage;

/// Heights of the horizontal bands a scrambled page was cut into, top to
/// bottom. Every band is `height / slice_count` tall except the last, which
/// also absorbs the division remainder so the bands exactly tile the image.
pub fn band_heights(height: u32, slice_count: u32) -> Vec<u32> {
    if slice_count == 0 {
        return Vec::new();
    }

    let base = height / slice_count;
    let remainder = height % slice_count;
    (0..slice_count)
        .map(|band| {
            if band == slice_count - 1 {
                base + remainder
            } else {
                base
            }
        })
        .collect()
}

/// Undo the origin's band scramble by redrawing the source bands in reverse
/// order: the bottom band of the source becomes the top band of the output.
///
/// The output has the same dimensions as the input. A slice count of 0 or 1
/// means the page was never scrambled and the source is returned unchanged.
pub fn descramble(image: &RgbaImage, slice_count: u32) -> RgbaImage {
    if slice_count <= 1 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let heights = band_heights(height, slice_count);

    let mut band_starts = Vec::with_capacity(heights.len());
    let mut next_start = 0u32;
    for band_height in &heights {
        band_starts.push(next_start);
        next_start += band_height;
    }

    let mut output = RgbaImage::new(width, height);
    let row_bytes = width as usize * 4;
    let source: &[u8] = image.as_raw();
    let target: &mut [u8] = &mut output;

    let mut dest_row = 0usize;
    for band in (0..heights.len()).rev() {
        let rows = heights[band] as usize;
        let src_offset = band_starts[band] as usize * row_bytes;
        let dest_offset = dest_row * row_bytes;
        let len = rows * row_bytes;
        target[dest_offset..dest_offset + len]
            .copy_from_slice(&source[src_offset..src_offset + len]);
        dest_row += rows;
    }

    output
}
