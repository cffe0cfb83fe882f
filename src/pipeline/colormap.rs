//! False-colour lookup tables, BGR ordered

/// 256-entry BGR lookup table
pub struct ColorLut([[u8; 3]; 256]);

impl ColorLut {
    fn from_fn(f: impl Fn(f32) -> [f32; 3]) -> Self {
        let mut lut = [[0u8; 3]; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            let [r, g, b] = f(i as f32 / 255.0);
            *entry = [to_u8(b), to_u8(g), to_u8(r)];
        }
        Self(lut)
    }

    /// Heat map: black -> red -> yellow -> white
    pub fn hot() -> Self {
        Self::from_fn(|v| [3.0 * v, 3.0 * v - 1.0, 3.0 * v - 2.0])
    }

    /// Jet: blue -> cyan -> yellow -> red
    pub fn jet() -> Self {
        Self::from_fn(|v| {
            [
                1.5 - (4.0 * v - 3.0).abs(),
                1.5 - (4.0 * v - 2.0).abs(),
                1.5 - (4.0 * v - 1.0).abs(),
            ]
        })
    }

    /// Jet with index 0 forced to black, so "no depth" stands apart from the
    /// nearest valid depth.
    pub fn jet_zero_black() -> Self {
        let mut lut = Self::jet();
        lut.0[0] = [0, 0, 0];
        lut
    }

    pub fn get(&self, index: u8) -> [u8; 3] {
        self.0[index as usize]
    }

    /// Map a grayscale buffer to interleaved BGR.
    pub fn apply(&self, gray: &[u8]) -> Vec<u8> {
        gray.iter().flat_map(|&g| self.get(g)).collect()
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_runs_black_to_white() {
        let hot = ColorLut::hot();
        assert_eq!(hot.get(0), [0, 0, 0]);
        assert_eq!(hot.get(255), [255, 255, 255]);
        // red saturates before green and blue
        let mid = hot.get(100);
        assert_eq!(mid[2], 255);
        assert!(mid[0] < mid[1]);
    }

    #[test]
    fn custom_jet_has_black_zero() {
        assert_ne!(ColorLut::jet().get(0), [0, 0, 0]);
        assert_eq!(ColorLut::jet_zero_black().get(0), [0, 0, 0]);
        assert_eq!(ColorLut::jet_zero_black().get(1), ColorLut::jet().get(1));
    }
}
