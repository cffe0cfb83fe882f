//! Bilinear Bayer demosaic for 16-bit mosaics

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerPattern {
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

/// Channel index in BGR order
const B: usize = 0;
const G: usize = 1;
const R: usize = 2;

impl BayerPattern {
    /// Colour filter (BGR channel index) over pixel `(x, y)`
    fn channel_at(self, x: usize, y: usize) -> usize {
        let (odd_x, odd_y) = (x & 1 == 1, y & 1 == 1);
        let top = match self {
            BayerPattern::Rggb => [R, G],
            BayerPattern::Bggr => [B, G],
            BayerPattern::Grbg => [G, R],
            BayerPattern::Gbrg => [G, B],
        };
        let bottom = match self {
            BayerPattern::Rggb => [G, B],
            BayerPattern::Bggr => [G, R],
            BayerPattern::Grbg => [B, G],
            BayerPattern::Gbrg => [R, G],
        };
        let row = if odd_y { bottom } else { top };
        row[odd_x as usize]
    }
}

/// Interpolate each missing channel from the same-colour samples in the 3x3
/// neighbourhood (clipped at the borders). Output is interleaved BGR.
pub fn demosaic(mosaic: &[u16], width: usize, height: usize, pattern: BayerPattern) -> Vec<u16> {
    let mut out = vec![0u16; width * height * 3];
    for y in 0..height {
        for x in 0..width {
            let own = pattern.channel_at(x, y);
            let mut sum = [0u32; 3];
            let mut n = [0u32; 3];
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let c = pattern.channel_at(nx, ny);
                    sum[c] += mosaic[ny * width + nx] as u32;
                    n[c] += 1;
                }
            }
            let px = &mut out[(y * width + x) * 3..][..3];
            for c in 0..3 {
                px[c] = if c == own {
                    mosaic[y * width + x]
                } else if n[c] > 0 {
                    (sum[c] / n[c]) as u16
                } else {
                    0
                };
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_field_stays_flat() {
        let mosaic = vec![1000u16; 4 * 4];
        let bgr = demosaic(&mosaic, 4, 4, BayerPattern::Grbg);
        assert!(bgr.iter().all(|&v| v == 1000));
    }

    #[test]
    fn pure_red_scene() {
        // only red sites carry signal
        let (w, h) = (4, 4);
        let p = BayerPattern::Rggb;
        let mosaic: Vec<u16> = (0..w * h)
            .map(|i| if p.channel_at(i % w, i / w) == R { 4000 } else { 0 })
            .collect();
        let bgr = demosaic(&mosaic, w, h, p);
        for px in bgr.chunks_exact(3) {
            assert_eq!(px[B], 0);
            assert_eq!(px[G], 0);
            assert_eq!(px[R], 4000);
        }
    }
}
