//! Configuration of the sorted group-by stage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use aqlflow_block::RegisterInfos;
use aqlflow_core::register::RegisterId;
use aqlflow_core::{Error, Result};

/// One aggregate: `output = function(input)` over the rows of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: String,
    /// `None` for functions that only count rows.
    pub input: Option<RegisterId>,
    pub output: RegisterId,
}

impl AggregateSpec {
    pub fn new(function: impl Into<String>, input: Option<RegisterId>, output: RegisterId) -> Self {
        Self {
            function: function.into(),
            input,
            output,
        }
    }
}

/// How the rows of a group are collected into one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CollectInto {
    #[default]
    Nothing,
    /// Push the value of `input` of every row.
    Expression { input: RegisterId, output: RegisterId },
    /// Push one object per row with the named registers as attributes.
    Variables {
        variables: Vec<(String, RegisterId)>,
        output: RegisterId,
    },
}

impl CollectInto {
    /// Register receiving the collected array.
    pub fn output(&self) -> Option<RegisterId> {
        match self {
            CollectInto::Nothing => None,
            CollectInto::Expression { output, .. } | CollectInto::Variables { output, .. } => {
                Some(*output)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortedCollectInfos {
    pub registers: Arc<RegisterInfos>,
    /// Group key pairs (input register, output register).
    pub groups: Vec<(RegisterId, RegisterId)>,
    pub aggregates: Vec<AggregateSpec>,
    /// Receives the number of rows folded into the group.
    pub count: Option<RegisterId>,
    pub into: CollectInto,
}

impl SortedCollectInfos {
    pub fn builder(registers: RegisterInfos) -> SortedCollectInfosBuilder {
        SortedCollectInfosBuilder {
            registers,
            groups: Vec::new(),
            aggregates: Vec::new(),
            count: None,
            into: CollectInto::Nothing,
        }
    }

    /// Every register that receives a value for an emitted group.
    fn outputs(&self) -> impl Iterator<Item = RegisterId> + '_ {
        self.groups
            .iter()
            .map(|(_, out)| *out)
            .chain(self.aggregates.iter().map(|a| a.output))
            .chain(self.count)
            .chain(self.into.output())
    }

    fn inputs(&self) -> impl Iterator<Item = RegisterId> + '_ {
        let into_inputs: Vec<RegisterId> = match &self.into {
            CollectInto::Nothing => Vec::new(),
            CollectInto::Expression { input, .. } => vec![*input],
            CollectInto::Variables { variables, .. } => variables.iter().map(|(_, r)| *r).collect(),
        };
        self.groups
            .iter()
            .map(|(input, _)| *input)
            .chain(self.aggregates.iter().filter_map(|a| a.input))
            .chain(into_inputs)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for out in self.outputs() {
            if !self.registers.is_writable(out) {
                return Err(Error::contract(format!(
                    "collect output register {out} is not writable"
                )));
            }
            if seen.contains(&out) {
                return Err(Error::contract(format!("collect output register {out} used twice")));
            }
            seen.push(out);
        }
        if seen.is_empty() {
            return Err(Error::BadParameter("collect without any output register".into()));
        }
        if seen.len() != self.registers.writable().len() {
            return Err(Error::contract(format!(
                "collect writes {} registers but {} are declared writable",
                seen.len(),
                self.registers.writable().len()
            )));
        }
        for input in self.inputs() {
            if input.index() >= self.registers.input_registers() {
                return Err(Error::contract(format!(
                    "collect input register {input} outside input width {}",
                    self.registers.input_registers()
                )));
            }
        }
        Ok(())
    }
}

pub struct SortedCollectInfosBuilder {
    registers: RegisterInfos,
    groups: Vec<(RegisterId, RegisterId)>,
    aggregates: Vec<AggregateSpec>,
    count: Option<RegisterId>,
    into: CollectInto,
}

impl SortedCollectInfosBuilder {
    pub fn group(mut self, input: impl Into<RegisterId>, output: impl Into<RegisterId>) -> Self {
        self.groups.push((input.into(), output.into()));
        self
    }

    pub fn aggregate(
        mut self,
        function: &str,
        input: Option<RegisterId>,
        output: impl Into<RegisterId>,
    ) -> Self {
        self.aggregates
            .push(AggregateSpec::new(function, input, output.into()));
        self
    }

    pub fn count_into(mut self, output: impl Into<RegisterId>) -> Self {
        self.count = Some(output.into());
        self
    }

    pub fn into_expression(mut self, input: impl Into<RegisterId>, output: impl Into<RegisterId>) -> Self {
        self.into = CollectInto::Expression {
            input: input.into(),
            output: output.into(),
        };
        self
    }

    pub fn into_variables(
        mut self,
        variables: Vec<(String, RegisterId)>,
        output: impl Into<RegisterId>,
    ) -> Self {
        self.into = CollectInto::Variables {
            variables,
            output: output.into(),
        };
        self
    }

    pub fn build(self) -> Result<SortedCollectInfos> {
        let infos = SortedCollectInfos {
            registers: Arc::new(self.registers),
            groups: self.groups,
            aggregates: self.aggregates,
            count: self.count,
            into: self.into,
        };
        infos.validate()?;
        Ok(infos)
    }
}
