// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Setup actions applied to freshly created host objects.
//!
//! A [`SetupActionList`] is an ordered list of property writes and method
//! calls. Actions resolve their capability handle once per target type
//! ([`SetupActionList::init_metadata`]) and are then applied in declared
//! order. A failing action is logged and skipped; the rest still run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::capability::{MethodCapability, PropertyCapability, TypeCapabilities};
use crate::error::{BindError, Result};
use crate::parameters::{AccessScope, ParameterCollection};
use crate::reflection::{HostKind, HostValue, MethodInfo, Scriptable};
use crate::value::ValueType;
use crate::value_source::{ParameterContext, ValueSource};

/// Type a source should be resolved as when written to `kind`.
///
/// Enum backed bytes take string sources by variant name.
fn binding_type(kind: &HostKind, declared: ValueType, source: &ValueSource) -> ValueType {
    if kind.enum_info().is_some() && source.value_type() == ValueType::String {
        ValueType::String
    } else {
        declared
    }
}

fn check_target(target: &dyn Scriptable, owner: std::any::TypeId, owner_name: &str) -> Result<()> {
    let info = target.type_info();
    if info.is_a(owner) {
        Ok(())
    } else {
        Err(BindError::TargetTypeMismatch {
            expected: owner_name.to_string(),
            actual: info.name.clone(),
        })
    }
}

/// Write one property
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetProperty {
    pub property: String,
    pub value: ValueSource,
    #[serde(skip)]
    resolved: Option<Arc<PropertyCapability>>,
}

impl SetProperty {
    pub fn new(property: impl Into<String>, value: ValueSource) -> Self {
        Self {
            property: property.into(),
            value,
            resolved: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Look up the property and align the value source type with it
    pub fn init_metadata(&mut self, caps: &TypeCapabilities) -> Result<()> {
        self.resolved = None;
        let property = caps
            .property(&self.property)
            .ok_or_else(|| BindError::PropertyNotFound(self.property.clone()))?;
        let want = binding_type(&property.kind, property.value_type, &self.value);
        self.value.set_type(want);
        self.resolved = Some(property.clone());
        Ok(())
    }

    pub fn apply(
        &self,
        target: &mut dyn Scriptable,
        params: &dyn ParameterCollection,
        ctx: &ParameterContext<'_>,
    ) -> Result<()> {
        let property = self
            .resolved
            .as_ref()
            .ok_or_else(|| BindError::MetadataNotInitialised(self.property.clone()))?;
        check_target(target, property.owner, &property.owner_name)?;

        let want = binding_type(&property.kind, property.value_type, &self.value);
        let value = self.value.resolve(want, params, ctx)?;
        let host = HostValue::from_value(&property.kind, value)?;

        let object = target.as_type_mut(property.owner).ok_or_else(|| {
            BindError::TargetTypeMismatch {
                expected: property.owner_name.clone(),
                actual: "unreachable base".to_string(),
            }
        })?;
        if property.field().set(object, host) {
            Ok(())
        } else {
            Err(BindError::HostRejected(format!(
                "property '{}' refused the value",
                self.property
            )))
        }
    }
}

/// Zero-initialised parameter block for one method invocation
pub struct ParamFrame {
    slots: SmallVec<[HostValue; 4]>,
}

impl ParamFrame {
    pub fn new(method: &MethodInfo) -> Self {
        Self {
            slots: method
                .params
                .iter()
                .map(|p| HostValue::default_for(&p.kind))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots_mut(&mut self) -> &mut [HostValue] {
        &mut self.slots
    }

    /// Release slots that own storage and empty the frame
    pub fn teardown(&mut self, method: &MethodInfo) {
        for (slot, param) in self.slots.iter_mut().zip(&method.params) {
            if param.kind.owns_storage() {
                *slot = HostValue::Null;
            }
        }
        self.slots.clear();
    }
}

/// Invoke one method with bound arguments
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallMethod {
    pub method: String,
    pub arguments: SmallVec<[ValueSource; 4]>,
    #[serde(skip)]
    resolved: Option<Arc<MethodCapability>>,
}

impl CallMethod {
    pub fn new(method: impl Into<String>, arguments: impl IntoIterator<Item = ValueSource>) -> Self {
        Self {
            method: method.into(),
            arguments: arguments.into_iter().collect(),
            resolved: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Look up the method, type existing arguments and add defaults for
    /// parameters that have none yet
    pub fn init_metadata(&mut self, caps: &TypeCapabilities) -> Result<()> {
        self.resolved = None;
        let method = caps
            .method(&self.method)
            .ok_or_else(|| BindError::MethodNotFound(self.method.clone()))?;

        for (index, arg) in method.arguments().enumerate() {
            let Some(declared) = arg.value_type else {
                continue;
            };
            match self.arguments.get_mut(index) {
                Some(source) => {
                    let want = binding_type(&arg.kind, declared, source);
                    source.set_type(want);
                }
                None => self.arguments.push(ValueSource::new(declared)),
            }
        }
        self.resolved = Some(method.clone());
        Ok(())
    }

    /// Bind every argument, then invoke. Nothing is invoked if any
    /// argument fails to bind.
    pub fn apply(
        &self,
        target: &mut dyn Scriptable,
        params: &dyn ParameterCollection,
        ctx: &ParameterContext<'_>,
    ) -> Result<()> {
        let capability = self
            .resolved
            .as_ref()
            .ok_or_else(|| BindError::MetadataNotInitialised(self.method.clone()))?;
        check_target(target, capability.owner, &capability.owner_name)?;

        let method = capability.method();
        let mut frame = ParamFrame::new(method);
        let mut failure = None;
        let mut next_argument = 0;

        for (slot, param) in capability.params.iter().enumerate() {
            if param.binds_target {
                frame.slots_mut()[slot] = HostValue::Target;
                continue;
            }
            let source = self.arguments.get(next_argument);
            next_argument += 1;
            let (Some(source), Some(declared)) = (source, param.value_type) else {
                continue;
            };

            let want = binding_type(&param.kind, declared, source);
            let bound = source
                .resolve(want, params, ctx)
                .and_then(|value| HostValue::from_value(&param.kind, value));
            match bound {
                Ok(value) => frame.slots_mut()[slot] = value,
                Err(err) => {
                    tracing::debug!(method = %self.method, argument = %param.name, error = %err, "argument failed to bind");
                    failure.get_or_insert(err);
                }
            }
        }

        let result = match failure {
            Some(err) => Err(err),
            None => match target.as_type_mut(capability.owner) {
                Some(object) => {
                    method.invoke(object, frame.slots_mut());
                    Ok(())
                }
                None => Err(BindError::TargetTypeMismatch {
                    expected: capability.owner_name.clone(),
                    actual: "unreachable base".to_string(),
                }),
            },
        };
        frame.teardown(method);
        result
    }
}

/// One declarative step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SetupAction {
    SetProperty(SetProperty),
    CallMethod(CallMethod),
}

impl SetupAction {
    pub fn set_property(property: impl Into<String>, value: ValueSource) -> Self {
        SetupAction::SetProperty(SetProperty::new(property, value))
    }

    pub fn call_method(
        method: impl Into<String>,
        arguments: impl IntoIterator<Item = ValueSource>,
    ) -> Self {
        SetupAction::CallMethod(CallMethod::new(method, arguments))
    }

    /// Property or method name this action targets
    pub fn member(&self) -> &str {
        match self {
            SetupAction::SetProperty(a) => &a.property,
            SetupAction::CallMethod(a) => &a.method,
        }
    }

    pub fn init_metadata(&mut self, caps: &TypeCapabilities) -> Result<()> {
        match self {
            SetupAction::SetProperty(a) => a.init_metadata(caps),
            SetupAction::CallMethod(a) => a.init_metadata(caps),
        }
    }

    pub fn apply(
        &self,
        target: &mut dyn Scriptable,
        params: &dyn ParameterCollection,
        ctx: &ParameterContext<'_>,
    ) -> Result<()> {
        match self {
            SetupAction::SetProperty(a) => a.apply(target, params, ctx),
            SetupAction::CallMethod(a) => a.apply(target, params, ctx),
        }
    }

    /// Value sources this action reads
    pub fn sources_mut(&mut self) -> impl Iterator<Item = &mut ValueSource> {
        let sources: SmallVec<[&mut ValueSource; 4]> = match self {
            SetupAction::SetProperty(a) => smallvec::smallvec![&mut a.value],
            SetupAction::CallMethod(a) => a.arguments.iter_mut().collect(),
        };
        sources.into_iter()
    }

    /// One line editor summary
    pub fn describe(&self, ctx: Option<&ParameterContext<'_>>) -> String {
        match self {
            SetupAction::SetProperty(a) => {
                format!("{} = {}", a.property, a.value.describe(ctx))
            }
            SetupAction::CallMethod(a) => {
                let args: Vec<String> = a.arguments.iter().map(|s| s.describe(ctx)).collect();
                format!("{}({})", a.method, args.join(", "))
            }
        }
    }
}

/// Outcome of applying a list
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplyReport {
    pub applied: usize,
    pub failed: Vec<(usize, BindError)>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered setup actions
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetupActionList {
    actions: Vec<SetupAction>,
}

impl SetupActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: SetupAction) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn with(mut self, action: SetupAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SetupAction> {
        self.actions.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, SetupAction> {
        self.actions.iter_mut()
    }

    pub fn remove(&mut self, index: usize) -> Option<SetupAction> {
        (index < self.actions.len()).then(|| self.actions.remove(index))
    }

    /// Resolve every action against `caps`; returns the actions that failed
    pub fn init_metadata(&mut self, caps: &TypeCapabilities) -> Vec<(usize, BindError)> {
        let mut failures = Vec::new();
        for (index, action) in self.actions.iter_mut().enumerate() {
            if let Err(err) = action.init_metadata(caps) {
                tracing::warn!(
                    index,
                    member = action.member(),
                    type_name = %caps.type_name,
                    error = %err,
                    "setup action has no bindable target"
                );
                failures.push((index, err));
            }
        }
        failures
    }

    /// Apply all actions in order to `target`
    pub fn apply(
        &self,
        target: &mut dyn Scriptable,
        params: &dyn ParameterCollection,
        ctx: &ParameterContext<'_>,
    ) -> ApplyReport {
        #[cfg(feature = "profiling")]
        let _span = info_span!("apply_setup_actions", count = self.actions.len()).entered();

        let _access = AccessScope::new(params);
        let mut report = ApplyReport::default();
        for (index, action) in self.actions.iter().enumerate() {
            match action.apply(target, params, ctx) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    tracing::warn!(
                        index,
                        member = action.member(),
                        error = %err,
                        "setup action failed"
                    );
                    report.failed.push((index, err));
                }
            }
        }
        report
    }
}

impl<'a> IntoIterator for &'a SetupActionList {
    type Item = &'a SetupAction;
    type IntoIter = std::slice::Iter<'a, SetupAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
