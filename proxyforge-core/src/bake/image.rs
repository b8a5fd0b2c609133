//! Linear float RGBA image used by capture and bake

use glam::Vec4;

/// Row-major RGBA float image
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec4>,
}

impl FloatImage {
    /// Create an image filled with `value`
    pub fn filled(width: u32, height: u32, value: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; (width * height) as usize],
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let i = self.index(x, y);
        self.pixels[i] = value;
    }

    /// Area-average every `factor x factor` block into one pixel
    pub fn downsample(&self, factor: u32) -> FloatImage {
        if factor <= 1 {
            return self.clone();
        }
        let width = (self.width / factor).max(1);
        let height = (self.height / factor).max(1);
        let mut out = FloatImage::filled(width, height, Vec4::ZERO);
        for y in 0..height {
            for x in 0..width {
                let mut sum = Vec4::ZERO;
                let mut count = 0u32;
                for sy in (y * factor)..((y + 1) * factor).min(self.height) {
                    for sx in (x * factor)..((x + 1) * factor).min(self.width) {
                        sum += self.get(sx, sy);
                        count += 1;
                    }
                }
                out.set(x, y, sum / count.max(1) as f32);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_averages_blocks() {
        let mut image = FloatImage::filled(4, 4, Vec4::ZERO);
        image.set(0, 0, Vec4::splat(4.0));
        image.set(3, 3, Vec4::ONE);
        let small = image.downsample(2);
        assert_eq!((small.width, small.height), (2, 2));
        assert_eq!(small.get(0, 0), Vec4::ONE);
        assert_eq!(small.get(1, 1), Vec4::splat(0.25));
        assert_eq!(small.get(1, 0), Vec4::ZERO);
    }

    #[test]
    fn test_downsample_by_one_is_identity() {
        let image = FloatImage::filled(3, 2, Vec4::new(0.1, 0.2, 0.3, 1.0));
        assert_eq!(image.downsample(1), image);
    }
}
