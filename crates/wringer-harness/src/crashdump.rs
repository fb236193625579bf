//! Crash-record parsing and validation
//!
//! A crash record is line-oriented text: a free-form preamble, then
//! one section per captured queue. A section starts with
//!
//! ```text
//! <label> command stream --- gtt_offset = 0x00000001 00203000
//! ```
//!
//! where the address is one hex field (32-bit) or a high/low pair
//! (64-bit), followed by word dumps, one per line:
//!
//! ```text
//! 00000004 :  00103000
//! ```
//!
//! where the left column is the byte offset into the batch and the
//! right column the 32-bit word at that offset.

use wringer_device::{DeviceCaps, Queue};

use crate::error::{CaseError, Result};

const SECTION_MARKER: &str = " command stream --- gtt_offset = 0x";

/// How a captured section is matched against the injected batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The recorded address and the batch contents must both match
    AddressAndContent,
    /// Contents only: a command-parsing layer rewrote batch addresses
    /// before execution, so the recorded address is not meaningful
    ContentOnly,
}

/// Pick the match mode for a device
pub fn mode_for(caps: &DeviceCaps) -> MatchMode {
    if caps.rewrites_addresses() {
        MatchMode::ContentOnly
    } else {
        MatchMode::AddressAndContent
    }
}

/// One captured command-stream section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashSection {
    pub label: String,
    pub gtt_offset: u64,
    pub words: Vec<u32>,
}

/// Split a crash record into its command-stream sections
pub fn parse(record: &str) -> Result<Vec<CrashSection>> {
    let mut sections: Vec<CrashSection> = Vec::new();

    for line in record.lines() {
        if let Some(pos) = line.find(SECTION_MARKER) {
            let label = line[..pos].trim().to_string();
            let mut halves = line[pos + SECTION_MARKER.len()..].split_whitespace();
            let first = parse_hex(halves.next(), "gtt_offset")?;
            // one field is a 32-bit address, two are a high/low pair
            let gtt_offset = match halves.next() {
                Some(lo) => u64::from(first) << 32 | u64::from(parse_hex(Some(lo), "gtt_offset low word")?),
                None => u64::from(first),
            };
            sections.push(CrashSection {
                label,
                gtt_offset,
                words: Vec::new(),
            });
            continue;
        }

        let Some(section) = sections.last_mut() else {
            continue; // preamble
        };
        let Some((left, right)) = line.split_once(':') else {
            continue;
        };
        let (Ok(offset), Ok(word)) = (
            u32::from_str_radix(left.trim(), 16),
            u32::from_str_radix(right.trim(), 16),
        ) else {
            continue;
        };
        if offset as usize != section.words.len() * 4 {
            return Err(CaseError::CrashRecordMalformed(format!(
                "non-contiguous dump in {:?} section: offset {:#x} at word {}",
                section.label,
                offset,
                section.words.len()
            )));
        }
        section.words.push(word);
    }

    if sections.is_empty() {
        return Err(CaseError::CrashRecordMalformed(
            "no command stream sections".to_string(),
        ));
    }
    Ok(sections)
}

fn parse_hex(field: Option<&str>, what: &str) -> Result<u32> {
    field
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| CaseError::CrashRecordMalformed(format!("bad {what}")))
}

/// Check that the record attributes the fault to `queue` and dumps the
/// injected batch: exactly one section may match, and it must carry
/// the queue's label
pub fn validate(record: &str, queue: Queue, addr: u64, batch_words: &[u32], mode: MatchMode) -> Result<()> {
    let sections = parse(record)?;

    let matches: Vec<&CrashSection> = sections
        .iter()
        .filter(|section| {
            let content_ok =
                section.words.len() >= batch_words.len() && section.words[..batch_words.len()] == *batch_words;
            match mode {
                MatchMode::AddressAndContent => content_ok && section.gtt_offset == addr,
                MatchMode::ContentOnly => content_ok,
            }
        })
        .collect();

    match matches.as_slice() {
        [] => Err(CaseError::CrashRecordMismatch(format!(
            "no section matches the batch submitted to {queue} at {addr:#x}"
        ))),
        [section] if section.label == queue.name() => Ok(()),
        [section] => Err(CaseError::CrashRecordMismatch(format!(
            "batch attributed to {:?}, expected {queue}",
            section.label
        ))),
        many => Err(CaseError::CrashRecordMismatch(format!(
            "{} sections match the injected batch",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> String {
        let mut record = String::from("simulated device error state\nreason: fault timer fired on blt queue\n");
        record.push_str("blt command stream --- gtt_offset = 0x00000000 00101000\n");
        for (i, word) in [0x1880_0001u32, 0x0010_1000, 0x0000_0000].iter().enumerate() {
            record.push_str(&format!("{:08x} :  {:08x}\n", 4 * i, word));
        }
        record.push_str("render command stream --- gtt_offset = 0x00000000 00000000\n");
        record.push_str("00000000 :  00000000\n");
        record
    }

    #[test]
    fn test_parse_sections() {
        let sections = parse(&sample_record()).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].label, "blt");
        assert_eq!(sections[0].gtt_offset, 0x0010_1000);
        assert_eq!(sections[0].words, vec![0x1880_0001, 0x0010_1000, 0]);
        assert_eq!(sections[1].label, "render");
    }

    #[test]
    fn test_parse_32bit_gtt_offset() {
        let record = "blt command stream --- gtt_offset = 0x00101000\n\
                      00000000 :  18800001\n\
                      00000004 :  00101000\n";
        let sections = parse(record).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].gtt_offset, 0x0010_1000);
        assert_eq!(sections[0].words, vec![0x1880_0001, 0x0010_1000]);
    }

    #[test]
    fn test_parse_rejects_gaps() {
        let record = "blt command stream --- gtt_offset = 0x00000000 00101000\n\
                      00000000 :  12345678\n\
                      00000008 :  9abcdef0\n";
        assert!(matches!(
            parse(record),
            Err(CaseError::CrashRecordMalformed(_))
        ));
    }

    #[test]
    fn test_parse_requires_sections() {
        assert!(matches!(
            parse("no error state collected\n"),
            Err(CaseError::CrashRecordMalformed(_))
        ));
    }

    #[test]
    fn test_validate_address_and_content() {
        let record = sample_record();
        let batch = [0x1880_0001u32, 0x0010_1000, 0x0000_0000];

        validate(&record, Queue::Blt, 0x0010_1000, &batch, MatchMode::AddressAndContent).unwrap();

        // wrong address
        assert!(validate(&record, Queue::Blt, 0x0020_2000, &batch, MatchMode::AddressAndContent).is_err());
        // same contents found regardless of address
        validate(&record, Queue::Blt, 0x0020_2000, &batch, MatchMode::ContentOnly).unwrap();
    }

    #[test]
    fn test_validate_checks_attribution() {
        let record = sample_record();
        let batch = [0x1880_0001u32, 0x0010_1000, 0x0000_0000];
        let err = validate(&record, Queue::Render, 0x0010_1000, &batch, MatchMode::AddressAndContent).unwrap_err();
        assert!(matches!(err, CaseError::CrashRecordMismatch(_)));
    }

    #[test]
    fn test_mode_for_follows_caps() {
        let mut caps = wringer_device::SimConfig::default().caps();
        assert_eq!(mode_for(&caps), MatchMode::AddressAndContent);

        caps = wringer_device::SimConfig::with_command_parser().caps();
        assert_eq!(mode_for(&caps), MatchMode::ContentOnly);

        caps.ppgtt = false;
        assert_eq!(mode_for(&caps), MatchMode::AddressAndContent);
    }
}
