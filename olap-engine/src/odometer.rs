//! Mixed-radix counter over per-dimension index ranges
//!
//! Drives both consolidation (over children lists) and view queries (over
//! selected elements) without materializing the cross product. The last
//! position turns fastest.

#[derive(Debug, Clone)]
pub struct Odometer {
    radices: Vec<usize>,
    digits: Vec<usize>,
    started: bool,
    exhausted: bool,
}

impl Odometer {
    /// A zero radix anywhere means there are no combinations at all
    pub fn new(radices: Vec<usize>) -> Self {
        let exhausted = radices.iter().any(|&r| r == 0);
        let digits = vec![0; radices.len()];
        Self {
            radices,
            digits,
            started: false,
            exhausted,
        }
    }

    /// Step to the next combination; `false` once all have been visited
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if !self.started {
            self.started = true;
            return true;
        }

        for pos in (0..self.digits.len()).rev() {
            self.digits[pos] += 1;
            if self.digits[pos] < self.radices[pos] {
                return true;
            }
            self.digits[pos] = 0;
        }

        self.exhausted = true;
        false
    }

    /// Current combination, valid after a successful `advance`
    pub fn digits(&self) -> &[usize] {
        &self.digits
    }

    /// Number of combinations, `None` on overflow
    pub fn total(&self) -> Option<u128> {
        self.radices
            .iter()
            .try_fold(1u128, |acc, &r| acc.checked_mul(r as u128))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
