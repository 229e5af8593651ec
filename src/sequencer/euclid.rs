/// Euclidean rhythm generator using Bjorklund's algorithm
/// Distributes k pulses as evenly as possible across n steps.
use super::STEPS;

/// A run of steps built up while interleaving, stored MSB-first.
#[derive(Debug, Clone, Copy)]
struct Group {
    bits: u32,
    len: u32,
}

impl Group {
    fn single(pulse: bool) -> Self {
        Self {
            bits: pulse as u32,
            len: 1,
        }
    }

    fn append(&mut self, tail: Group) {
        self.bits = (self.bits << tail.len) | tail.bits;
        self.len += tail.len;
    }
}

/// Append the last `count` groups onto the first `count`, pairing the
/// outermost ones first, then drop the tails.
fn fold_tails(groups: &mut Vec<Group>, count: usize) {
    let len = groups.len();
    for i in 0..count {
        let tail = groups[len - 1 - i];
        groups[i].append(tail);
    }
    groups.truncate(len - count);
}

fn rotate_right(pattern: u16, by: u32, len: u32) -> u16 {
    let mask: u32 = (1 << len) - 1;
    let value = pattern as u32 & mask;
    let by = by % len;
    if by == 0 {
        return value as u16;
    }
    (((value >> by) | (value << (len - by))) & mask) as u16
}

/// Compute an `steps`-long pattern with `beats` pulses, rotated right by `offset`.
///
/// Bit `steps - 1 - i` is set when step `i` is a pulse. Inputs are clamped:
/// `steps` to 1..=16, `beats` to 0..=steps, `offset` modulo `steps`.
pub fn euclid(steps: i16, beats: i16, offset: i16) -> u16 {
    let steps = steps.clamp(1, STEPS as i16) as usize;
    let beats = beats.clamp(0, steps as i16) as usize;
    let offset = offset.max(0) as u32;

    // no pulses to spread: every group would be a pause
    if beats == 0 {
        return 0;
    }

    let pauses = steps - beats;
    let mut groups: Vec<Group> = (0..steps).map(|i| Group::single(i < beats)).collect();

    let per_pulse = pauses / beats;
    let remainder = pauses % beats;
    if per_pulse > 0 && remainder < 2 {
        // each pulse takes the same number of pauses, at most one left over
        for pulse in 0..beats {
            for _ in 0..per_pulse {
                if let Some(tail) = groups.pop() {
                    groups[pulse].append(tail);
                }
            }
        }
    } else {
        let mut group_a = beats;
        let mut group_b = pauses;
        while group_b > 1 {
            if group_a > group_b {
                let a_remainder = group_a - group_b;
                fold_tails(&mut groups, group_b);
                group_a = group_b;
                group_b = a_remainder;
            } else if group_b > group_a {
                fold_tails(&mut groups, group_a);
                group_b -= group_a;
            } else {
                fold_tails(&mut groups, group_a);
                group_b = 0;
            }
        }
    }

    let pattern = groups.iter().fold(0u32, |acc, g| (acc << g.len) | g.bits) as u16;
    if offset > 0 {
        rotate_right(pattern, offset, steps as u32)
    } else {
        pattern
    }
}

/// True when step `index` of an `steps`-long pattern is a pulse
pub fn is_pulse(pattern: u16, steps: i16, index: usize) -> bool {
    let steps = steps.clamp(1, STEPS as i16) as usize;
    index < steps && pattern & (1 << (steps - 1 - index)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(pattern: u16, steps: i16) -> String {
        (0..steps as usize)
            .map(|i| if is_pulse(pattern, steps, i) { 'x' } else { '.' })
            .collect()
    }

    #[test]
    fn test_tresillo() {
        let pattern = euclid(8, 3, 0);
        assert_eq!(pattern, 0b1001_0010);
        assert_eq!(render(pattern, 8), "x..x..x.");
    }

    #[test]
    fn test_four_on_the_floor() {
        assert_eq!(render(euclid(16, 4, 0), 16), "x...x...x...x...");
    }

    #[test]
    fn test_classic_patterns() {
        assert_eq!(render(euclid(7, 3, 0), 7), "x.x.x..");
        assert_eq!(render(euclid(8, 5, 0), 8), "x.xx.xx.");
        assert_eq!(render(euclid(5, 2, 0), 5), "x.x..");
        assert_eq!(render(euclid(13, 5, 0), 13).matches('x').count(), 5);
    }

    #[test]
    fn test_pulse_count_and_spacing() {
        for steps in 1..=16i16 {
            for beats in 0..=steps {
                let pattern = euclid(steps, beats, 0);
                assert_eq!(pattern.count_ones() as i16, beats, "E({},{})", beats, steps);
                assert!(pattern < (1u32 << steps) as u16 || steps == 16);

                let onsets: Vec<usize> = (0..steps as usize)
                    .filter(|&i| is_pulse(pattern, steps, i))
                    .collect();
                if beats > 0 {
                    assert_eq!(onsets[0], 0, "E({},{}) starts on a pulse", beats, steps);
                }
                // gaps differ by at most one step, counting the wrap around
                if onsets.len() > 1 {
                    let mut gaps: Vec<usize> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
                    gaps.push(steps as usize - onsets[onsets.len() - 1] + onsets[0]);
                    let min = *gaps.iter().min().unwrap();
                    let max = *gaps.iter().max().unwrap();
                    assert!(max - min <= 1, "E({},{}) gaps {:?}", beats, steps, gaps);
                }
            }
        }
    }

    #[test]
    fn test_no_beats_is_silent() {
        for steps in 1..=16 {
            assert_eq!(euclid(steps, 0, 0), 0);
            assert_eq!(euclid(steps, 0, 3), 0);
        }
    }

    #[test]
    fn test_all_beats_is_all_pulses() {
        for steps in 1..=16i16 {
            let full = ((1u32 << steps) - 1) as u16;
            assert_eq!(euclid(steps, steps, 0), full);
            assert_eq!(euclid(steps, steps, 5), full);
        }
    }

    #[test]
    fn test_offset_rotates_right() {
        for steps in 1..=16i16 {
            for beats in 0..=steps {
                let base = euclid(steps, beats, 0);
                for offset in 0..steps {
                    assert_eq!(
                        euclid(steps, beats, offset),
                        rotate_right(base, offset as u32, steps as u32)
                    );
                }
            }
        }
        assert_eq!(render(euclid(8, 3, 1), 8), ".x..x..x");
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        assert_eq!(euclid(40, 4, 0), euclid(16, 4, 0));
        assert_eq!(euclid(8, 12, 0), euclid(8, 8, 0));
        assert_eq!(euclid(0, 1, 0), 1);
        assert_eq!(euclid(8, -2, 0), 0);
    }
}
