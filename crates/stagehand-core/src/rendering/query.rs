//! Instance queries built at registration and run every render tick.
//!
//! A query matches non-prefab entities carrying the renderer's transform type
//! that inherit from any of the configured prefabs. Optional terms require a
//! [`Color`] or [`CustomData`] component. Results can be ordered by origin
//! along one axis; the sort is stable so ties keep world iteration order.

use std::collections::HashSet;
use std::ops::ControlFlow;

use glam::Vec3;
use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

use crate::components::{Color, CustomData, IsA, Prefab, Transform2D, Transform3D};
use crate::prefab;
use crate::rendering::server::TransformFormat;

/// Origin axis used to order instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Transform components the sync systems can read and pack.
pub trait InstanceTransform: hecs::Component + Copy {
    const FORMAT: TransformFormat;

    fn origin(&self) -> Vec3;

    /// Write the host's row-major layout into `out`, which holds exactly
    /// `FORMAT.base_stride()` floats.
    fn write_packed(&self, out: &mut [f32]);
}

impl InstanceTransform for Transform2D {
    const FORMAT: TransformFormat = TransformFormat::Transform2D;

    fn origin(&self) -> Vec3 {
        self.0.translation.extend(0.0)
    }

    fn write_packed(&self, out: &mut [f32]) {
        let x = self.0.matrix2.x_axis;
        let y = self.0.matrix2.y_axis;
        let o = self.0.translation;
        out.copy_from_slice(&[x.x, y.x, 0.0, o.x, x.y, y.y, 0.0, o.y]);
    }
}

impl InstanceTransform for Transform3D {
    const FORMAT: TransformFormat = TransformFormat::Transform3D;

    fn origin(&self) -> Vec3 {
        self.0.translation.into()
    }

    fn write_packed(&self, out: &mut [f32]) {
        let basis = self.0.matrix3;
        let (r0, r1, r2) = (basis.row(0), basis.row(1), basis.row(2));
        let o = self.0.translation;
        out.copy_from_slice(&[
            r0.x, r1.x, r2.x, o.x, //
            r0.y, r1.y, r2.y, o.y, //
            r0.z, r1.z, r2.z, o.z,
        ]);
    }
}

/// One matched entity.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRow<T> {
    pub entity: Entity,
    pub transform: T,
    pub color: Option<Color>,
    pub custom_data: Option<CustomData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceQuery {
    format: TransformFormat,
    prefabs: Vec<Entity>,
    with_color: bool,
    with_custom_data: bool,
    order_by: Option<Axis>,
}

impl InstanceQuery {
    pub fn builder(format: TransformFormat) -> InstanceQueryBuilder {
        InstanceQueryBuilder {
            query: InstanceQuery {
                format,
                prefabs: Vec::new(),
                with_color: false,
                with_custom_data: false,
                order_by: None,
            },
        }
    }

    pub fn format(&self) -> TransformFormat {
        self.format
    }

    pub fn prefabs(&self) -> &[Entity] {
        &self.prefabs
    }

    pub fn order_by(&self) -> Option<Axis> {
        self.order_by
    }

    /// A query with no prefab term matches nothing.
    pub fn is_trivial(&self) -> bool {
        self.prefabs.is_empty()
    }

    /// Resolve the prefab terms against the current world. Resolve once per
    /// tick and reuse the result for both counting and packing.
    pub fn prepare(&self, world: &World) -> PreparedQuery<'_> {
        let prefabs = if self.is_trivial() {
            HashSet::new()
        } else {
            prefab::descendants(world, &self.prefabs)
        };
        PreparedQuery { query: self, prefabs }
    }

    /// Number of entities a run would visit.
    pub fn count(&self, world: &World) -> usize {
        self.prepare(world).count(world)
    }

    /// Visit matched rows in order until `visit` breaks.
    pub fn run<T, F>(&self, world: &World, visit: F)
    where
        T: InstanceTransform,
        F: FnMut(&InstanceRow<T>) -> ControlFlow<()>,
    {
        self.prepare(world).run(world, visit);
    }
}

/// An [`InstanceQuery`] whose prefab terms are expanded to every prefab that
/// inherits from them, so matching an entity only inspects its own `IsA`.
///
/// Inheritance is followed through prefab entities only.
pub struct PreparedQuery<'q> {
    query: &'q InstanceQuery,
    prefabs: HashSet<Entity>,
}

impl PreparedQuery<'_> {
    fn matches(&self, is_a: &IsA, color: Option<&Color>, custom: Option<&CustomData>) -> bool {
        (!self.query.with_color || color.is_some())
            && (!self.query.with_custom_data || custom.is_some())
            && is_a.0.iter().any(|parent| self.prefabs.contains(parent))
    }

    /// Number of entities a run would visit. Allocates nothing.
    pub fn count(&self, world: &World) -> usize {
        if self.prefabs.is_empty() {
            return 0;
        }
        match self.query.format {
            TransformFormat::Transform2D => self.count_of::<Transform2D>(world),
            TransformFormat::Transform3D => self.count_of::<Transform3D>(world),
        }
    }

    fn count_of<T: InstanceTransform>(&self, world: &World) -> usize {
        world
            .query::<(&T, &IsA, Option<&Color>, Option<&CustomData>)>()
            .without::<&Prefab>()
            .iter()
            .filter(|(_, is_a, color, custom)| self.matches(is_a, *color, *custom))
            .count()
    }

    /// Visit matched rows in order until `visit` breaks.
    ///
    /// `T` must agree with the query's format; a mismatch visits nothing.
    /// Rows are only buffered when an order is requested.
    pub fn run<T, F>(&self, world: &World, mut visit: F)
    where
        T: InstanceTransform,
        F: FnMut(&InstanceRow<T>) -> ControlFlow<()>,
    {
        if T::FORMAT != self.query.format || self.prefabs.is_empty() {
            return;
        }

        let mut query = world
            .query::<(Entity, &T, &IsA, Option<&Color>, Option<&CustomData>)>()
            .without::<&Prefab>();
        let rows = query
            .iter()
            .filter(|(_, _, is_a, color, custom)| self.matches(is_a, *color, *custom))
            .map(|(entity, transform, _, color, custom)| InstanceRow {
                entity,
                transform: *transform,
                color: color.copied(),
                custom_data: custom.copied(),
            });

        match self.query.order_by {
            None => {
                for row in rows {
                    if visit(&row).is_break() {
                        break;
                    }
                }
            }
            Some(axis) => {
                let mut rows: Vec<InstanceRow<T>> = rows.collect();
                rows.sort_by(|a, b| {
                    axis_value(a.transform.origin(), axis).total_cmp(&axis_value(b.transform.origin(), axis))
                });
                for row in &rows {
                    if visit(row).is_break() {
                        break;
                    }
                }
            }
        }
    }
}

fn axis_value(origin: Vec3, axis: Axis) -> f32 {
    match axis {
        Axis::X => origin.x,
        Axis::Y => origin.y,
        Axis::Z => origin.z,
    }
}

pub struct InstanceQueryBuilder {
    query: InstanceQuery,
}

impl InstanceQueryBuilder {
    /// Add an is-a term. Terms are OR-ed together.
    pub fn is_a(mut self, prefab: Entity) -> Self {
        if !self.query.prefabs.contains(&prefab) {
            self.query.prefabs.push(prefab);
        }
        self
    }

    pub fn with_color(mut self, required: bool) -> Self {
        self.query.with_color = required;
        self
    }

    pub fn with_custom_data(mut self, required: bool) -> Self {
        self.query.with_custom_data = required;
        self
    }

    pub fn order_by(mut self, axis: Option<Axis>) -> Self {
        self.query.order_by = axis;
        self
    }

    pub fn build(self) -> InstanceQuery {
        self.query
    }
}
