/// Braille Unicode canvas for high-resolution terminal graphics.
/// Each character cell represents a 2x4 pixel grid (8 dots).
/// Unicode Braille patterns: U+2800 to U+28FF
pub struct BrailleCanvas {
    width: usize,  // Characters
    height: usize, // Characters
    cells: Vec<u8>, // Bit patterns, row-major
}

impl BrailleCanvas {
    /// Create a new canvas with the given character dimensions.
    /// Effective pixel resolution: width*2 x height*4
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0u8; width * height],
        }
    }

    /// Set a pixel at the given coordinates.
    /// Braille dot layout per character:
    /// ```text
    /// (0,0) (1,0)   bits: 0x01 0x08
    /// (0,1) (1,1)   bits: 0x02 0x10
    /// (0,2) (1,2)   bits: 0x04 0x20
    /// (0,3) (1,3)   bits: 0x40 0x80
    /// ```
    #[inline(always)]
    pub fn set_pixel(&mut self, x: usize, y: usize) {
        const BITS: [[u8; 4]; 2] = [[0x01, 0x02, 0x04, 0x40], [0x08, 0x10, 0x20, 0x80]];

        let cx = x / 2;
        let cy = y / 4;
        if cx >= self.width || cy >= self.height {
            return;
        }
        self.cells[cy * self.width + cx] |= BITS[x % 2][y % 4];
    }

    /// Set a pixel using signed coordinates (ignores negative values)
    #[inline(always)]
    pub fn set_pixel_signed(&mut self, x: i32, y: i32) {
        if x >= 0 && y >= 0 {
            self.set_pixel(x as usize, y as usize);
        }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|&b| b == 0)
    }

    /// Non-empty characters as (column, row, glyph)
    pub fn glyphs(&self) -> impl Iterator<Item = (u16, u16, char)> + '_ {
        let width = self.width.max(1);
        self.cells.iter().enumerate().filter_map(move |(i, &b)| {
            (b != 0).then(|| ((i % width) as u16, (i / width) as u16, glyph(b)))
        })
    }

    /// Convert the canvas to a string of Braille characters
    #[cfg(test)]
    pub fn to_string(&self) -> String {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| row.iter().map(|&b| glyph(b)).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[inline(always)]
fn glyph(bits: u8) -> char {
    char::from_u32(0x2800 + bits as u32).unwrap_or(' ')
}
