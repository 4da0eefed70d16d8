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

//! Resource entries: the nodes of an authored resource list.

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityCache;
use crate::error::{BindError, Result};
use crate::material::MaterialEntry;
use crate::parameters::{AccessScope, ParameterCollection};
use crate::reflection::{Scriptable, TypeRegistry};
use crate::resource_list::EntryKey;
use crate::setup::{ApplyReport, SetupActionList};
use crate::value::{Frame, ValueType};
use crate::value_source::{ParameterContext, SourceKind};

/// Name given to the implicit frame parameter of placeable assets
pub const PLACEMENT_FRAME_NAME: &str = "Placement Frame";

/// Id of the implicit frame parameter of placeable assets
pub const PLACEMENT_FRAME_ID: u32 = 1;

/// Parameter an asset expects the generation engine to supply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedParameter {
    /// Stable id, `0` until assigned
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: ValueType,
    pub name: String,
}

impl ExpectedParameter {
    pub fn new(id: u32, kind: ValueType, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }
}

/// Host asset reference plus its parameter contract
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Host asset path
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ExpectedParameter>,
}

impl AssetEntry {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: Some(asset.into()),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ExpectedParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Index and declaration of parameter `id`
    pub fn find_parameter(&self, id: u32) -> Option<(usize, &ExpectedParameter)> {
        self.parameters.iter().enumerate().find(|(_, p)| p.id == id)
    }

    pub fn first_frame_parameter(&self) -> Option<(usize, &ExpectedParameter)> {
        self.parameters
            .iter()
            .enumerate()
            .find(|(_, p)| p.kind == ValueType::Frame)
    }

    /// Assign ids to unnumbered parameters. Placeable assets with no
    /// parameters get the implicit placement frame.
    pub fn normalize_parameters(&mut self, placeable: bool) {
        if placeable && self.parameters.is_empty() {
            self.parameters.push(ExpectedParameter::new(
                PLACEMENT_FRAME_ID,
                ValueType::Frame,
                PLACEMENT_FRAME_NAME,
            ));
        }
        let mut next = self.parameters.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        for parameter in self.parameters.iter_mut().filter(|p| p.id == 0) {
            parameter.id = next;
            next += 1;
        }
    }

    pub fn context(&self) -> ParameterContext<'_> {
        ParameterContext::new(&self.parameters)
    }
}

/// Axis aligned bounds as centre and half extent
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub centre: Vec3,
    pub extent: Vec3,
}

impl Bounds {
    /// 1m cube used when nothing better is known
    pub const UNIT_CUBE: Bounds = Bounds {
        centre: Vec3::ZERO,
        extent: Vec3::splat(50.0),
    };

    pub fn new(centre: Vec3, extent: Vec3) -> Self {
        Self { centre, extent }
    }

    /// Bounds after `transform`, extents kept positive
    pub fn transformed(&self, transform: &Mat4) -> Bounds {
        Bounds {
            centre: transform.transform_vector3(self.centre),
            extent: transform.transform_vector3(self.extent).abs(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame::from_centre_extent(self.centre, self.extent)
    }
}

/// Where a 3D asset's bounds come from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsSource {
    /// Reported by the referenced asset
    #[default]
    Asset,
    /// Reported by another mesh
    Mesh,
    /// Authored values
    Custom,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundsSpec {
    pub source: BoundsSource,
    /// Bounds the host reported for the asset or reference mesh
    #[serde(default)]
    pub reported: Option<Bounds>,
    pub custom: Bounds,
}

impl BoundsSpec {
    pub fn custom(bounds: Bounds) -> Self {
        Self {
            source: BoundsSource::Custom,
            reported: None,
            custom: bounds,
        }
    }

    /// Raw bounds before fixups
    pub fn source_bounds(&self) -> Bounds {
        match self.source {
            BoundsSource::Asset | BoundsSource::Mesh => self.reported.unwrap_or(Bounds::UNIT_CUBE),
            BoundsSource::Custom => self.custom,
        }
    }
}

impl Default for BoundsSpec {
    fn default() -> Self {
        Self {
            source: BoundsSource::Asset,
            reported: None,
            custom: Bounds::UNIT_CUBE,
        }
    }
}

/// Which face of the asset ends up on top
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Default,
    Left,
    Right,
    Back,
    Forward,
    Over,
}

impl Orientation {
    /// Quarter turns as (pitch, roll)
    fn quarter_turns(self) -> (i32, i32) {
        match self {
            Orientation::Default => (0, 0),
            Orientation::Left => (0, 1),
            Orientation::Right => (0, -1),
            Orientation::Back => (1, 0),
            Orientation::Forward => (-1, 0),
            Orientation::Over => (0, -2),
        }
    }
}

/// Whether an entry's fixup replaces or extends its variant group's fixup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixupMode {
    #[default]
    Relative,
    Absolute,
}

/// Authored correction applied to an asset before placement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementFixup {
    pub enabled: bool,
    pub orientation: Orientation,
    /// Quarter turns about the vertical axis
    pub rotation: i32,
    pub uniform_scale: f32,
    pub scale: Vec3,
}

impl Default for PlacementFixup {
    fn default() -> Self {
        Self {
            enabled: false,
            orientation: Orientation::Default,
            rotation: 0,
            uniform_scale: 1.0,
            scale: Vec3::ONE,
        }
    }
}

impl PlacementFixup {
    /// Scale first, then orientation, then rotation about the vertical
    pub fn transform(&self, include_scaling: bool) -> Mat4 {
        if !self.enabled {
            return Mat4::IDENTITY;
        }
        let scale = if include_scaling {
            self.scale * self.uniform_scale
        } else {
            Vec3::ONE
        };
        let quarter = std::f32::consts::FRAC_PI_2;
        let (pitch, roll) = self.orientation.quarter_turns();
        let ori = Mat4::from_rotation_y(pitch as f32 * quarter)
            * Mat4::from_rotation_x(roll as f32 * quarter);
        let rot = Mat4::from_rotation_z(self.rotation as f32 * quarter);
        rot * ori * Mat4::from_scale(scale)
    }
}

/// How placement is sized from its inputs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeMode {
    /// Fit the asset's bounds to the supplied size
    #[default]
    Size,
    /// Use the supplied value as a plain scale factor
    Scale,
}

/// Where a placed instance's offset, scale and rotation come from.
///
/// A parameter id of `0` selects the matching custom value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    pub offset_parameter: u32,
    pub custom_offset: Vec3,
    pub size_mode: SizeMode,
    pub scale_parameter: u32,
    pub custom_scale: Vec3,
    pub rotation_parameter: u32,
    /// Euler degrees, applied X then Y then Z
    pub custom_rotation: Vec3,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            offset_parameter: PLACEMENT_FRAME_ID,
            custom_offset: Vec3::ZERO,
            size_mode: SizeMode::Size,
            scale_parameter: PLACEMENT_FRAME_ID,
            custom_scale: Vec3::ONE,
            rotation_parameter: PLACEMENT_FRAME_ID,
            custom_rotation: Vec3::ZERO,
        }
    }
}

/// Resolved placement of one instance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Scale is relative to the normalised asset (size mode)
    pub normalised: bool,
}

impl PlacementPolicy {
    pub fn resolve(&self, asset: &AssetEntry, params: &dyn ParameterCollection) -> Placement {
        let _access = AccessScope::new(params);
        let lookup = |id: u32| -> Option<usize> {
            if id == 0 {
                None
            } else {
                asset.find_parameter(id).map(|(index, _)| index)
            }
        };
        let euler = |v: Vec3| {
            Quat::from_euler(
                EulerRot::XYZ,
                v.x.to_radians(),
                v.y.to_radians(),
                v.z.to_radians(),
            )
        };

        let translation = match lookup(self.offset_parameter) {
            Some(index) => params
                .frame(index)
                .map(|f| f.centre())
                .or_else(|| params.vector(index))
                .unwrap_or(Vec3::ZERO),
            None => self.custom_offset,
        };
        let scale = match lookup(self.scale_parameter) {
            Some(index) => params
                .frame(index)
                .map(|f| f.size)
                .or_else(|| params.vector(index))
                .unwrap_or(Vec3::ONE),
            None => self.custom_scale,
        };
        let rotation = match lookup(self.rotation_parameter) {
            Some(index) => params
                .frame(index)
                .map(|f| f.to_transform().rotation)
                .or_else(|| params.vector(index).map(euler))
                .unwrap_or(Quat::IDENTITY),
            None => euler(self.custom_rotation),
        };

        Placement {
            translation,
            rotation,
            scale,
            normalised: self.size_mode == SizeMode::Size,
        }
    }
}

/// Asset with spatial extent
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset3dEntry {
    pub base: AssetEntry,
    #[serde(default)]
    pub bounds: BoundsSpec,
    #[serde(default)]
    pub fixup_mode: FixupMode,
    #[serde(default)]
    pub fixup: PlacementFixup,
    #[serde(default)]
    pub placement: PlacementPolicy,
}

impl Asset3dEntry {
    pub fn new(base: AssetEntry) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    pub fn with_bounds(mut self, bounds: BoundsSpec) -> Self {
        self.bounds = bounds;
        self
    }

    /// Fixup combined with the enclosing variant group's, parent first
    pub fn fixup_transform(&self, group: Option<&PlacementFixup>, include_scaling: bool) -> Mat4 {
        let local = self.fixup.transform(include_scaling);
        match (self.fixup_mode, group) {
            (FixupMode::Absolute, _) | (FixupMode::Relative, None) => local,
            (FixupMode::Relative, Some(group)) => local * group.transform(include_scaling),
        }
    }

    /// Bounds exposed to the generation engine
    pub fn bounds(&self, group: Option<&PlacementFixup>) -> Bounds {
        self.bounds
            .source_bounds()
            .transformed(&self.fixup_transform(group, true))
    }

    /// Maps the raw asset into a unit box at the origin, fixups applied
    pub fn normalised_transform(&self, group: Option<&PlacementFixup>) -> Mat4 {
        let source = self.bounds.source_bounds();
        let safe = |e: f32| if e.abs() < 1e-6 { 1.0 } else { 0.5 / e };
        let normalise = Vec3::new(
            safe(source.extent.x),
            safe(source.extent.y),
            safe(source.extent.z),
        );
        self.fixup_transform(group, false)
            * Mat4::from_scale(normalise)
            * Mat4::from_translation(-source.centre)
    }
}

/// Scriptable template plus the actions that configure each instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub placed: Asset3dEntry,
    /// Registered host type name
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub actions: SetupActionList,
    /// Parameter references still stored as 1-based parameter indices
    #[serde(default)]
    pub legacy_parameter_indices: bool,
}

impl ComponentEntry {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Default::default()
        }
    }

    /// Resolve the template type and bind every action to it.
    ///
    /// Returns the per-action failures; an unknown template is an error.
    pub fn init_metadata(
        &mut self,
        registry: &TypeRegistry,
        cache: &CapabilityCache,
    ) -> Result<Vec<(usize, BindError)>> {
        let name = self
            .template
            .as_deref()
            .ok_or_else(|| BindError::TypeNotFound("<none>".to_string()))?;
        let info = registry
            .get(name)
            .ok_or_else(|| BindError::TypeNotFound(name.to_string()))?;
        let caps = cache.get(info);
        Ok(self.actions.init_metadata(&caps))
    }

    /// Change the template type and rebind
    pub fn set_template(
        &mut self,
        template: impl Into<String>,
        registry: &TypeRegistry,
        cache: &CapabilityCache,
    ) -> Result<Vec<(usize, BindError)>> {
        self.template = Some(template.into());
        self.init_metadata(registry, cache)
    }

    /// Create a template instance and apply the setup actions to it
    pub fn instantiate(
        &self,
        registry: &TypeRegistry,
        params: &dyn ParameterCollection,
    ) -> Result<(Box<dyn Scriptable>, ApplyReport)> {
        let name = self
            .template
            .as_deref()
            .ok_or_else(|| BindError::TypeNotFound("<none>".to_string()))?;
        let mut object = registry
            .get(name)
            .and_then(|info| info.instantiate())
            .ok_or_else(|| BindError::TypeNotFound(name.to_string()))?;
        let report = self.apply(object.as_mut(), params);
        Ok((object, report))
    }

    /// Apply the setup actions to an existing target
    pub fn apply(&self, target: &mut dyn Scriptable, params: &dyn ParameterCollection) -> ApplyReport {
        let ctx = self.placed.base.context();
        self.actions.apply(target, params, &ctx)
    }

    /// Rewrite index based parameter references to ids.
    ///
    /// Only meaningful for data authored before parameters had stable ids.
    pub fn upgrade_legacy(&mut self) -> usize {
        if !self.legacy_parameter_indices {
            return 0;
        }
        let parameters = &self.placed.base.parameters;
        let mut remapped = 0;
        for action in self.actions.iter_mut() {
            for source in action.sources_mut() {
                if source.source() != SourceKind::Parameter || source.parameter_id() == 0 {
                    continue;
                }
                let index = source.parameter_id() as usize - 1;
                match parameters.get(index) {
                    Some(p) => {
                        source.remap_parameter(p.id);
                        remapped += 1;
                    }
                    None => {
                        tracing::warn!(index, "legacy parameter index out of range");
                        source.remap_parameter(0);
                    }
                }
            }
        }
        self.legacy_parameter_indices = false;
        remapped
    }
}

/// Group of interchangeable entries selected by 1-based number
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantsEntry {
    #[serde(default)]
    pub fixup: PlacementFixup,
}

/// Pointer to another resource list to search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReference {
    pub list: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EntryKind {
    Folder,
    Asset(AssetEntry),
    Asset3d(Asset3dEntry),
    Material(MaterialEntry),
    Component(ComponentEntry),
    Variants(VariantsEntry),
    ListReference(ListReference),
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Folder => "folder",
            EntryKind::Asset(_) => "asset",
            EntryKind::Asset3d(_) => "3d asset",
            EntryKind::Material(_) => "material",
            EntryKind::Component(_) => "component",
            EntryKind::Variants(_) => "variants",
            EntryKind::ListReference(_) => "list reference",
        }
    }

    pub fn asset(&self) -> Option<&AssetEntry> {
        match self {
            EntryKind::Asset(a) => Some(a),
            EntryKind::Asset3d(a) => Some(&a.base),
            EntryKind::Material(m) => Some(&m.base),
            EntryKind::Component(c) => Some(&c.placed.base),
            _ => None,
        }
    }

    pub fn asset_mut(&mut self) -> Option<&mut AssetEntry> {
        match self {
            EntryKind::Asset(a) => Some(a),
            EntryKind::Asset3d(a) => Some(&mut a.base),
            EntryKind::Material(m) => Some(&mut m.base),
            EntryKind::Component(c) => Some(&mut c.placed.base),
            _ => None,
        }
    }

    pub fn spatial(&self) -> Option<&Asset3dEntry> {
        match self {
            EntryKind::Asset3d(a) => Some(a),
            EntryKind::Component(c) => Some(&c.placed),
            _ => None,
        }
    }

    /// Whether instances are placed in space and take a placement frame
    pub fn is_placeable(&self) -> bool {
        self.spatial().is_some()
    }
}

/// One node of a resource list
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default)]
    pub children: Vec<EntryKey>,
    pub kind: EntryKind,
}

impl ResourceEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            kind,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Folder)
    }

    pub fn is_variants(&self) -> bool {
        matches!(self.kind, EntryKind::Variants(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterList;
    use crate::setup::SetupAction;
    use crate::value::Value;
    use crate::value_source::ValueSource;

    #[test]
    fn test_placeable_gets_implicit_frame() {
        let mut asset = AssetEntry::new("/Game/Chair");
        asset.normalize_parameters(true);
        assert_eq!(
            asset.parameters,
            vec![ExpectedParameter::new(1, ValueType::Frame, PLACEMENT_FRAME_NAME)]
        );

        let mut plain = AssetEntry::new("/Game/Sound");
        plain.normalize_parameters(false);
        assert!(plain.parameters.is_empty());
    }

    #[test]
    fn test_unassigned_ids_follow_highest() {
        let mut asset = AssetEntry::new("/Game/Chair")
            .with_parameter(ExpectedParameter::new(0, ValueType::Float, "Height"))
            .with_parameter(ExpectedParameter::new(4, ValueType::Frame, "Frame"))
            .with_parameter(ExpectedParameter::new(0, ValueType::Bool, "Cushion"));
        asset.normalize_parameters(true);
        let ids: Vec<u32> = asset.parameters.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 4, 6]);
        assert_eq!(asset.first_frame_parameter().map(|(i, _)| i), Some(1));
    }

    #[test]
    fn test_fixup_rotation_and_scale() {
        let fixup = PlacementFixup {
            enabled: true,
            rotation: 1,
            uniform_scale: 2.0,
            ..Default::default()
        };
        let m = fixup.transform(true);
        let x = m.transform_vector3(Vec3::X);
        assert!(x.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

        let unscaled = fixup.transform(false).transform_vector3(Vec3::X);
        assert!(unscaled.abs_diff_eq(Vec3::Y, 1e-5));

        assert_eq!(PlacementFixup::default().transform(true), Mat4::IDENTITY);
    }

    #[test]
    fn test_bounds_follow_group_fixup_unless_absolute() {
        let mut chair = Asset3dEntry::new(AssetEntry::new("/Game/Chair")).with_bounds(
            BoundsSpec::custom(Bounds::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(20.0, 5.0, 10.0))),
        );
        let group = PlacementFixup {
            enabled: true,
            rotation: 1,
            ..Default::default()
        };

        let rotated = chair.bounds(Some(&group));
        assert!(rotated.extent.abs_diff_eq(Vec3::new(5.0, 20.0, 10.0), 1e-4));

        chair.fixup_mode = FixupMode::Absolute;
        let own = chair.bounds(Some(&group));
        assert!(own.extent.abs_diff_eq(Vec3::new(20.0, 5.0, 10.0), 1e-4));

        let frame = own.to_frame();
        assert!(frame.origin.abs_diff_eq(Vec3::new(-20.0, -5.0, 0.0), 1e-4));
        assert!(frame.size.abs_diff_eq(Vec3::new(40.0, 10.0, 20.0), 1e-4));
    }

    #[test]
    fn test_normalised_transform_maps_bounds_to_unit_box() {
        let asset = Asset3dEntry::new(AssetEntry::new("/Game/Box")).with_bounds(BoundsSpec::custom(
            Bounds::new(Vec3::new(10.0, 0.0, 0.0), Vec3::splat(5.0)),
        ));
        let m = asset.normalised_transform(None);
        let corner = m.transform_point3(Vec3::new(15.0, 5.0, 5.0));
        assert!(corner.abs_diff_eq(Vec3::splat(0.5), 1e-5));
    }

    #[test]
    fn test_placement_from_frame_parameter() {
        let mut asset = AssetEntry::new("/Game/Chair");
        asset.normalize_parameters(true);
        let params = ParameterList::new().with(
            PLACEMENT_FRAME_ID,
            Value::Frame(Frame::new(Vec3::new(1.0, 1.0, 0.0), Vec3::new(2.0, 4.0, 6.0))),
        );
        let placement = PlacementPolicy::default().resolve(&asset, &params);
        assert_eq!(placement.translation, Vec3::new(2.0, 3.0, 3.0));
        assert_eq!(placement.scale, Vec3::new(2.0, 4.0, 6.0));
        assert!(placement.normalised);

        let custom = PlacementPolicy {
            offset_parameter: 0,
            custom_offset: Vec3::Z,
            ..Default::default()
        };
        assert_eq!(custom.resolve(&asset, &params).translation, Vec3::Z);
    }

    #[test]
    fn test_legacy_indices_upgrade_to_ids() {
        let mut component = ComponentEntry::new("Lamp");
        component.placed.base.parameters = vec![
            ExpectedParameter::new(10, ValueType::Frame, "Frame"),
            ExpectedParameter::new(20, ValueType::Colour, "Colour"),
        ];
        component.actions.push(SetupAction::set_property(
            "Tint",
            ValueSource::parameter(ValueType::Colour, 2),
        ));
        component.actions.push(SetupAction::set_property(
            "Name",
            ValueSource::constant(Value::String("x".into())),
        ));
        component.legacy_parameter_indices = true;

        assert_eq!(component.upgrade_legacy(), 1);
        assert!(!component.legacy_parameter_indices);
        match component.actions.iter().next() {
            Some(SetupAction::SetProperty(action)) => assert_eq!(action.value.parameter_id(), 20),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(component.upgrade_legacy(), 0);
    }
}
