//! CEC opcode tables.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::IntoStaticStr;

#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CecOpCode {
    IMAGE_VIEW_ON = 0x04,
    TEXT_VIEW_ON = 0x0D,
    STANDBY = 0x36,
    GIVE_OSD_NAME = 0x46,
    ACTIVE_SOURCE = 0x82,
    GIVE_PHYSICAL_ADDRESS = 0x83,
    REPORT_PHYSICAL_ADDRESS = 0x84,
    DEVICE_VENDOR_ID = 0x87,
    GIVE_DEVICE_VENDOR_ID = 0x8C,
    GIVE_DEVICE_POWER_STATUS = 0x8F,
    REPORT_POWER_STATUS = 0x90,
    INACTIVE_SOURCE = 0x9D,
    CEC_VERSION = 0x9E,
    GET_CEC_VERSION = 0x9F,
}

impl CecOpCode {
    /// Name of a raw opcode byte, if it is one we know.
    pub fn name_of(opcode: u8) -> Option<&'static str> {
        CecOpCode::try_from(opcode).ok().map(Into::into)
    }
}
