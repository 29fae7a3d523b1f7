// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The fixed tool catalogue (§4.8): seven handlers the model may invoke as
//! function calls, six visible to every group and one (`register_group`)
//! restricted to main.

pub mod generate_image;
pub mod register_group;
pub mod schedule_task;
pub mod set_preference;
pub mod task_control;

pub use generate_image::GenerateImageTool;
pub use register_group::RegisterGroupTool;
pub use schedule_task::ScheduleTaskTool;
pub use set_preference::SetPreferenceTool;
pub use task_control::{CancelTaskTool, PauseTaskTool, ResumeTaskTool};
