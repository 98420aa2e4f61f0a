//! Utilities for dealing with User Data Headers (used for concatenated SMS,
//! port addressing, and other vestigial TP-UD extensions).
use crate::errors::UdhError;

/// One decoded `IEI, IEL, IED` triplet. All IEIs except the two
/// concatenation forms are stored opaquely -- this crate never needs to
/// interpret anything else in the chain.
#[derive(Debug, Clone)]
pub struct InformationElement {
    pub id: u8,
    pub data: Vec<u8>,
}

/// A fully parsed Information-Element chain.
#[derive(Debug, Clone, Default)]
pub struct UserDataHeader {
    pub elements: Vec<InformationElement>,
}

/// Concatenated Short Message coordinates, normalized to the 16-bit
/// reference form regardless of which IEI carried them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatenatedShortMessages {
    pub reference_number: u16,
    pub maximum: u8,
    pub sequence: u8,
}

impl UserDataHeader {
    /// Parse a UDH body (the IE chain *without* the leading UDHL octet).
    /// Enforces the per-IEI length constraints for the two Concatenated-SM
    /// forms; every other IEI is accepted at any length.
    pub fn parse(bytes: &[u8]) -> Result<Self, UdhError> {
        let mut elements = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            if bytes.len() - offset < 2 {
                return Err(UdhError::BadLength);
            }
            let id = bytes[offset];
            let len = bytes[offset + 1] as usize;
            offset += 2;

            if bytes.len() - offset < len {
                return Err(UdhError::BadLength);
            }

            match id {
                0 if len != 3 => return Err(UdhError::BadLength),
                8 if len != 4 => return Err(UdhError::BadLength),
                _ => {}
            }

            let data = bytes[offset..offset + len].to_vec();
            offset += len;
            elements.push(InformationElement { id, data });
        }
        Ok(UserDataHeader { elements })
    }

    /// True if this message carries an Application Port Addressing IE
    /// (IEI 4 or 5) -- the core treats these as application-level (WAP/MMS)
    /// payloads and skips them rather than reassembling them as text.
    pub fn is_port_addressed(&self) -> bool {
        self.elements.iter().any(|e| e.id == 4 || e.id == 5)
    }

    /// The Concatenated-SM coordinates, if present. The 16-bit-reference
    /// form (IEI 8) wins if both are present; the 8-bit form (IEI 0) is
    /// zero-extended into the same `u16` reference space.
    pub fn concatenation(&self) -> Option<ConcatenatedShortMessages> {
        if let Some(e) = self.elements.iter().find(|e| e.id == 8 && e.data.len() == 4) {
            return Some(ConcatenatedShortMessages {
                reference_number: u16::from_be_bytes([e.data[0], e.data[1]]),
                maximum: e.data[2],
                sequence: e.data[3],
            });
        }
        if let Some(e) = self.elements.iter().find(|e| e.id == 0 && e.data.len() == 3) {
            return Some(ConcatenatedShortMessages {
                reference_number: e.data[0] as u16,
                maximum: e.data[1],
                sequence: e.data[2],
            });
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eight_bit_reference_zero_extends() {
        let udh = UserDataHeader {
            elements: vec![InformationElement { id: 0, data: vec![0x42, 2, 1] }],
        };
        let c = udh.concatenation().unwrap();
        assert_eq!(c.reference_number, 0x42);
        assert_eq!(c.maximum, 2);
        assert_eq!(c.sequence, 1);
    }

    #[test]
    fn sixteen_bit_reference_wins_over_eight_bit() {
        let udh = UserDataHeader {
            elements: vec![
                InformationElement { id: 0, data: vec![0x01, 2, 1] },
                InformationElement { id: 8, data: vec![0x12, 0x34, 2, 1] },
            ],
        };
        let c = udh.concatenation().unwrap();
        assert_eq!(c.reference_number, 0x1234);
    }

    #[test]
    fn port_addressing_detected() {
        let udh = UserDataHeader {
            elements: vec![InformationElement { id: 5, data: vec![0x0B, 0x84, 0x0B, 0x84] }],
        };
        assert!(udh.is_port_addressed());
    }

    #[test]
    fn wrong_length_for_concatenation_iei_is_rejected() {
        let err = UserDataHeader::parse(&[0, 2, 0x42, 1]).unwrap_err();
        assert_eq!(err, UdhError::BadLength);
    }

    #[test]
    fn truncated_chain_is_rejected() {
        let err = UserDataHeader::parse(&[0, 3, 0x42, 2]).unwrap_err();
        assert_eq!(err, UdhError::BadLength);
    }

    #[test]
    fn opaque_iei_round_trips() {
        let udh = UserDataHeader::parse(&[0x99, 2, 0xAA, 0xBB]).unwrap();
        assert_eq!(udh.elements.len(), 1);
        assert_eq!(udh.elements[0].id, 0x99);
        assert!(!udh.is_port_addressed());
        assert!(udh.concatenation().is_none());
    }
}
