//! RT Plan 后装相关标签

use dicom::core::Tag;

pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);

pub const RT_PLAN_LABEL: Tag = Tag(0x300A, 0x0002);
pub const RT_PLAN_DATE: Tag = Tag(0x300A, 0x0006);
pub const RT_PLAN_TIME: Tag = Tag(0x300A, 0x0007);

// 剂量参考点
pub const DOSE_REFERENCE_SEQUENCE: Tag = Tag(0x300A, 0x0010);
pub const DOSE_REFERENCE_NUMBER: Tag = Tag(0x300A, 0x0012);
pub const DOSE_REFERENCE_DESCRIPTION: Tag = Tag(0x300A, 0x0016);
pub const DOSE_REFERENCE_POINT_COORDINATES: Tag = Tag(0x300A, 0x0018);
pub const TARGET_PRESCRIPTION_DOSE: Tag = Tag(0x300A, 0x0026);

// 分次组与处方
pub const FRACTION_GROUP_SEQUENCE: Tag = Tag(0x300A, 0x0070);
pub const BRACHY_APPLICATION_SETUP_DOSE: Tag = Tag(0x300A, 0x00A4);
pub const REFERENCED_BRACHY_APPLICATION_SETUP_SEQUENCE: Tag = Tag(0x300C, 0x000A);

// 放射源
pub const SOURCE_SEQUENCE: Tag = Tag(0x300A, 0x0210);
pub const SOURCE_ISOTOPE_NAME: Tag = Tag(0x300A, 0x0226);
pub const SOURCE_ISOTOPE_HALF_LIFE: Tag = Tag(0x300A, 0x0228);
pub const REFERENCE_AIR_KERMA_RATE: Tag = Tag(0x300A, 0x022A);
pub const SOURCE_STRENGTH_REFERENCE_DATE: Tag = Tag(0x300A, 0x022C);
pub const SOURCE_STRENGTH_REFERENCE_TIME: Tag = Tag(0x300A, 0x022E);

// 施源器与通道
pub const APPLICATION_SETUP_SEQUENCE: Tag = Tag(0x300A, 0x0230);
pub const CHANNEL_SEQUENCE: Tag = Tag(0x300A, 0x0280);
pub const CHANNEL_NUMBER: Tag = Tag(0x300A, 0x0282);
pub const CHANNEL_TOTAL_TIME: Tag = Tag(0x300A, 0x0286);
pub const FINAL_CUMULATIVE_TIME_WEIGHT: Tag = Tag(0x300A, 0x02C8);

// 控制点
pub const BRACHY_CONTROL_POINT_SEQUENCE: Tag = Tag(0x300A, 0x02D0);
pub const CONTROL_POINT_3D_POSITION: Tag = Tag(0x300A, 0x02D4);
pub const CUMULATIVE_TIME_WEIGHT: Tag = Tag(0x300A, 0x02D6);
