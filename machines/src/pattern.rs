//! The four fixed byte-sequence test patterns.

/// Test pattern selected by BTN0..BTN3 / SW0..SW3.
///
/// Each pattern is an arithmetic byte sequence `start + n * increment`
/// (mod 256). The increments are odd, so every pattern visits all 256
/// byte values within a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestPattern {
    A,
    B,
    C,
    D,
}

impl TestPattern {
    pub const ALL: [TestPattern; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub const fn start(self) -> u8 {
        match self {
            Self::A => 0x00,
            Self::B => 0x08,
            Self::C => 0x10,
            Self::D => 0x18,
        }
    }

    pub const fn increment(self) -> u8 {
        match self {
            Self::A => 0x01,
            Self::B => 0x07,
            Self::C => 0x0F,
            Self::D => 0x17,
        }
    }

    /// Byte `offset` positions into the sequence.
    pub const fn byte_at(self, offset: usize) -> u8 {
        self.start()
            .wrapping_add(self.increment().wrapping_mul(offset as u8))
    }

    pub const fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }

    /// Input line (BTNn / SWn) that selects this pattern.
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
        }
    }

    /// Pattern wired to input line `index` (0..=3).
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn generator(self) -> PatternGenerator {
        PatternGenerator::new(self)
    }
}

/// Endless stream of pattern bytes, restartable at a page boundary.
#[derive(Clone, Debug)]
pub struct PatternGenerator {
    pattern: TestPattern,
    next: u8,
}

impl PatternGenerator {
    pub fn new(pattern: TestPattern) -> Self {
        Self {
            pattern,
            next: pattern.start(),
        }
    }

    pub fn pattern(&self) -> TestPattern {
        self.pattern
    }

    pub fn restart(&mut self) {
        self.next = self.pattern.start();
    }

    pub fn next_byte(&mut self) -> u8 {
        let value = self.next;
        self.next = self.next.wrapping_add(self.pattern.increment());
        value
    }
}

impl Iterator for PatternGenerator {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        Some(self.next_byte())
    }
}
