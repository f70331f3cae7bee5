//! Scripted fault injection

use crate::error::SimError;
use std::fmt;
use std::str::FromStr;
use strata_cloud::{ErrorKind, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(()),
        }
    }
}

/// One scripted failure, consumed `times` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub resource_type: String,
    pub operation: Operation,
    pub kind: ErrorKind,
    pub times: u32,
    /// Fail after the change was made, as when a response is lost.
    pub after_commit: bool,
}

impl Fault {
    pub fn new(resource_type: impl Into<String>, operation: Operation, kind: ErrorKind) -> Self {
        Self {
            resource_type: resource_type.into(),
            operation,
            kind,
            times: 1,
            after_commit: false,
        }
    }

    pub fn transient(resource_type: impl Into<String>, operation: Operation) -> Self {
        Self::new(resource_type, operation, ErrorKind::Transient)
    }

    pub fn permanent(resource_type: impl Into<String>, operation: Operation) -> Self {
        Self::new(resource_type, operation, ErrorKind::Permanent)
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }

    /// Keep failing on every call.
    pub fn always(self) -> Self {
        self.times(u32::MAX)
    }

    pub fn after_commit(mut self) -> Self {
        self.after_commit = true;
        self
    }

    fn error(&self) -> ProviderError {
        match self.kind {
            ErrorKind::Transient => ProviderError::transient(format!(
                "Throttling: rate exceeded for {} {}",
                self.operation, self.resource_type
            )),
            ErrorKind::Permanent => ProviderError::permanent(format!(
                "AccessDenied: not authorized to {} {}",
                self.operation, self.resource_type
            )),
        }
    }
}

/// `vpc:create:permanent` or `subnet:read:transient:3`
impl FromStr for Fault {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SimError::InvalidFault(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(3..=4).contains(&parts.len()) || parts[0].is_empty() {
            return Err(invalid());
        }
        let operation = parts[1].parse::<Operation>().map_err(|_| invalid())?;
        let fault = match parts[2] {
            "transient" => Fault::transient(parts[0], operation),
            "permanent" => Fault::permanent(parts[0], operation),
            _ => return Err(invalid()),
        };
        match parts.get(3) {
            Some(times) => Ok(fault.times(times.parse().map_err(|_| invalid())?)),
            None => Ok(fault),
        }
    }
}

/// Pending faults, checked in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    faults: Vec<Fault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn into_faults(self) -> Vec<Fault> {
        self.faults
    }

    /// Consume the first matching fault, if any.
    pub(crate) fn take(
        &mut self,
        resource_type: &str,
        operation: Operation,
        after_commit: bool,
    ) -> Option<ProviderError> {
        let position = self.faults.iter().position(|f| {
            f.resource_type == resource_type
                && f.operation == operation
                && f.after_commit == after_commit
        })?;
        let fault = &mut self.faults[position];
        let error = fault.error();
        if fault.times != u32::MAX {
            fault.times -= 1;
        }
        if fault.times == 0 {
            self.faults.remove(position);
        }
        Some(error)
    }
}

/// Comma-separated list of faults
impl FromStr for FaultPlan {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let faults = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Fault>, _>>()?;
        Ok(Self { faults })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fault_plan() {
        let plan: FaultPlan = "vpc:create:permanent, subnet:read:transient:3".parse().unwrap();
        assert_eq!(
            plan.faults,
            vec![
                Fault::permanent("vpc", Operation::Create),
                Fault::transient("subnet", Operation::Read).times(3),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["vpc", "vpc:explode:permanent", "vpc:create:sometimes", "vpc:create:transient:x"] {
            assert!(input.parse::<Fault>().is_err(), "{} should not parse", input);
        }
    }

    #[test]
    fn test_take_consumes_counted_faults() {
        let mut plan = FaultPlan::new();
        plan.push(Fault::transient("vpc", Operation::Create).times(2));

        assert!(plan.take("subnet", Operation::Create, false).is_none());
        assert!(plan.take("vpc", Operation::Delete, false).is_none());
        assert!(plan.take("vpc", Operation::Create, false).unwrap().is_transient());
        assert!(plan.take("vpc", Operation::Create, false).is_some());
        assert!(plan.take("vpc", Operation::Create, false).is_none());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_always_never_runs_out() {
        let mut plan = FaultPlan::new();
        plan.push(Fault::permanent("vpc", Operation::Delete).always());
        for _ in 0..10 {
            assert!(!plan.take("vpc", Operation::Delete, false).unwrap().is_transient());
        }
    }
}
