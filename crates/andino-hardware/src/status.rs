//! Status string of the I/O emulator.
//!
//! ```text
//! {counter,...}{input,...}{relay,...}
//!  optional     mandatory  optional
//! ```
//!
//! Counters are lowercase hex, inputs and relays are `0`/`1`. Blocks are
//! concatenated without a separator.

use std::fmt::Display;

/// Render one `{a,b,c}` block.
pub fn format_block<T: Display>(values: impl IntoIterator<Item = T>) -> String {
    let body: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
    format!("{{{}}}", body.join(","))
}

/// Render the full status string.
///
/// ```
/// use andino_hardware::status::format_status;
///
/// let status = format_status(Some(&[1, 2][..]), &[true, false], Some(&[false, true][..]));
/// assert_eq!(status, "{1,2}{1,0}{0,1}");
/// assert_eq!(format_status(None, &[true], None), "{1}");
/// ```
pub fn format_status(counters: Option<&[u32]>, inputs: &[bool], relays: Option<&[bool]>) -> String {
    let mut status = String::new();
    if let Some(counters) = counters {
        status.push_str(&format_block(counters.iter().map(|c| format!("{c:x}"))));
    }
    status.push_str(&format_block(inputs.iter().map(|&i| u8::from(i))));
    if let Some(relays) = relays {
        status.push_str(&format_block(relays.iter().map(|&r| u8::from(r))));
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_counters_are_lowercase_hex() {
        assert_eq!(
            format_status(Some(&[10, 255, 0xFFFE][..]), &[false; 3], None),
            "{a,ff,fffe}{0,0,0}"
        );
    }

    #[test]
    fn test_empty_blocks() {
        assert_eq!(format_status(Some(&[][..]), &[], Some(&[][..])), "{}{}{}");
    }

    proptest! {
        #[test]
        fn prop_block_count_follows_flags(
            inputs in prop::collection::vec(any::<bool>(), 1..8),
            with_counters in any::<bool>(),
            with_relays in any::<bool>(),
        ) {
            let counters = vec![1u32; inputs.len()];
            let relays = vec![true; 3];
            let status = format_status(
                with_counters.then_some(counters.as_slice()),
                &inputs,
                with_relays.then_some(relays.as_slice()),
            );
            let blocks = andino_protocol::status_blocks(&status);
            prop_assert_eq!(blocks.len(), 1 + usize::from(with_counters) + usize::from(with_relays));
            let input_block = &blocks[usize::from(with_counters)];
            prop_assert_eq!(input_block.len(), inputs.len());
        }
    }
}
