//! Register plan of a single stage.

use serde::{Deserialize, Serialize};

use aqlflow_core::register::{RegisterId, RegisterSet};
use aqlflow_core::{Error, Result};

/// Which registers a stage reads, writes and copies through.
///
/// `keep` is a stack: level 0 applies to data rows, level `d + 1` to shadow
/// rows of depth `d`. Depths beyond the stack reuse its last level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterInfos {
    input_registers: usize,
    output_registers: usize,
    writable: RegisterSet,
    keep: Vec<RegisterSet>,
}

impl RegisterInfos {
    pub fn new(
        input_registers: usize,
        output_registers: usize,
        writable: RegisterSet,
        mut keep: Vec<RegisterSet>,
    ) -> Result<Self> {
        if keep.is_empty() {
            keep.push(RegisterSet::new());
        }
        if writable.width() > output_registers {
            return Err(Error::contract(format!(
                "output register {} exceeds block width {output_registers}",
                writable.width() - 1
            )));
        }
        let kept_width = input_registers.min(output_registers);
        for (level, regs) in keep.iter().enumerate() {
            if regs.width() > kept_width {
                return Err(Error::contract(format!(
                    "kept register {} at level {level} exceeds block width {kept_width}",
                    regs.width() - 1
                )));
            }
        }
        if let Some(reg) = keep[0].iter().find(|r| writable.contains(*r)) {
            return Err(Error::contract(format!(
                "register {reg} is both kept and written"
            )));
        }
        Ok(Self {
            input_registers,
            output_registers,
            writable,
            keep,
        })
    }

    /// A stage that writes nothing and copies all `width` registers at every level.
    pub fn passthrough(width: usize) -> Self {
        Self {
            input_registers: width,
            output_registers: width,
            writable: RegisterSet::new(),
            keep: vec![RegisterSet::first(width as u32)],
        }
    }

    pub fn input_registers(&self) -> usize {
        self.input_registers
    }

    pub fn output_registers(&self) -> usize {
        self.output_registers
    }

    pub fn writable(&self) -> &RegisterSet {
        &self.writable
    }

    pub fn is_writable(&self, reg: RegisterId) -> bool {
        self.writable.contains(reg)
    }

    /// Registers copied into the output for a data row.
    pub fn keep_for_data(&self) -> &RegisterSet {
        &self.keep[0]
    }

    /// Registers copied into the output for a shadow row of `depth`.
    pub fn keep_for_shadow(&self, depth: u32) -> &RegisterSet {
        let level = depth as usize + 1;
        self.keep
            .get(level)
            .or_else(|| self.keep.last())
            .unwrap_or(&self.keep[0])
    }

    pub fn keep_levels(&self) -> usize {
        self.keep.len()
    }
}
