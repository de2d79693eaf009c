use crate::types::{FrameType, SequenceNumber, VcId};
use alloc::vec::Vec;

/// A TC transfer frame handed to the engine by the virtual-channel framer.
///
/// The engine reads the frame type, the virtual channel and N(S); the payload
/// (the encoded frame body) is opaque and is carried through to the lower
/// layer untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcTransferFrame {
    pub frame_type: FrameType,
    pub vc_id: VcId,
    /// N(S) stamped by the framer. Meaningful for Type-AD frames only.
    pub sequence_number: SequenceNumber,
    pub payload: Vec<u8>,
}

impl TcTransferFrame {
    /// Creates a Type-AD frame carrying `sequence_number` as N(S).
    pub fn new_ad(vc_id: VcId, sequence_number: SequenceNumber, payload: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Ad,
            vc_id,
            sequence_number,
            payload,
        }
    }

    /// Creates a Type-BD frame. BD frames carry no sequence number.
    pub fn new_bd(vc_id: VcId, payload: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Bd,
            vc_id,
            sequence_number: 0,
            payload,
        }
    }

    /// Creates a Type-BC frame. Used by framer implementations when the
    /// engine dispatches an Unlock or Set V(R) control command.
    pub fn new_bc(vc_id: VcId, payload: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Bc,
            vc_id,
            sequence_number: 0,
            payload,
        }
    }
}
