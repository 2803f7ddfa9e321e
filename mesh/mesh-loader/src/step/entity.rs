//! Typed view of the entity instances the reconstruction needs.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use nalgebra::Vector3;

use super::lexer::Param;

/// Entity id (`#id`).
pub type EntityId = u64;

/// A decoded entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// `CARTESIAN_POINT`
    Point(Vector3<f64>),
    /// `DIRECTION`
    Direction(Vector3<f64>),
    /// `VECTOR`
    Vector { direction: EntityId, magnitude: f64 },
    /// `AXIS2_PLACEMENT_3D`
    Placement {
        location: EntityId,
        axis: Option<EntityId>,
        ref_direction: Option<EntityId>,
    },
    /// `PLANE`
    Plane { position: EntityId },
    /// `LINE`
    Line { point: EntityId, vector: EntityId },
    /// `CIRCLE`
    Circle { position: EntityId, radius: f64 },
    /// `VERTEX_POINT`
    VertexPoint(EntityId),
    /// `EDGE_CURVE`
    EdgeCurve {
        start: EntityId,
        end: EntityId,
        curve: EntityId,
        same_sense: bool,
    },
    /// `ORIENTED_EDGE`
    OrientedEdge { edge: EntityId, orientation: bool },
    /// `EDGE_LOOP`
    EdgeLoop(Vec<EntityId>),
    /// `POLY_LOOP`
    PolyLoop(Vec<EntityId>),
    /// `FACE_BOUND` / `FACE_OUTER_BOUND`
    FaceBound {
        bound: EntityId,
        orientation: bool,
        outer: bool,
    },
    /// `ADVANCED_FACE` / `FACE_SURFACE`
    Face {
        bounds: Vec<EntityId>,
        surface: EntityId,
        same_sense: bool,
    },
    /// Any other instance, kept so references to it resolve.
    Other(String),
}

impl Entity {
    /// Decode a simple instance. Unknown types become [`Entity::Other`].
    ///
    /// # Errors
    ///
    /// Returns a description if a known type has malformed parameters.
    pub fn decode(name: &str, params: &[Param]) -> Result<Self, String> {
        let p = Params(params);
        Ok(match name {
            "CARTESIAN_POINT" => Self::Point(p.coordinates(1)?),
            "DIRECTION" => Self::Direction(p.coordinates(1)?),
            "VECTOR" => Self::Vector {
                direction: p.reference(1)?,
                magnitude: p.real(2)?,
            },
            "AXIS2_PLACEMENT_3D" => Self::Placement {
                location: p.reference(1)?,
                axis: p.optional_reference(2)?,
                ref_direction: p.optional_reference(3)?,
            },
            "PLANE" => Self::Plane {
                position: p.reference(1)?,
            },
            "LINE" => Self::Line {
                point: p.reference(1)?,
                vector: p.reference(2)?,
            },
            "CIRCLE" => Self::Circle {
                position: p.reference(1)?,
                radius: p.real(2)?,
            },
            "VERTEX_POINT" => Self::VertexPoint(p.reference(1)?),
            "EDGE_CURVE" => Self::EdgeCurve {
                start: p.reference(1)?,
                end: p.reference(2)?,
                curve: p.reference(3)?,
                same_sense: p.boolean(4)?,
            },
            "ORIENTED_EDGE" => Self::OrientedEdge {
                edge: p.reference(3)?,
                orientation: p.boolean(4)?,
            },
            "EDGE_LOOP" => Self::EdgeLoop(p.references(1)?),
            "POLY_LOOP" => Self::PolyLoop(p.references(1)?),
            "FACE_BOUND" | "FACE_OUTER_BOUND" => Self::FaceBound {
                bound: p.reference(1)?,
                orientation: p.boolean(2)?,
                outer: name == "FACE_OUTER_BOUND",
            },
            "ADVANCED_FACE" | "FACE_SURFACE" => Self::Face {
                bounds: p.references(1)?,
                surface: p.reference(2)?,
                same_sense: p.boolean(3)?,
            },
            other => Self::Other(other.to_string()),
        })
    }

    /// Ids this entity needs for reconstruction.
    pub fn references(&self) -> Vec<EntityId> {
        match self {
            Self::Point(_) | Self::Direction(_) | Self::Other(_) => Vec::new(),
            Self::Vector { direction, .. } => vec![*direction],
            Self::Placement {
                location,
                axis,
                ref_direction,
            } => std::iter::once(*location)
                .chain(*axis)
                .chain(*ref_direction)
                .collect(),
            Self::Plane { position } | Self::Circle { position, .. } => vec![*position],
            Self::Line { point, vector } => vec![*point, *vector],
            Self::VertexPoint(point) => vec![*point],
            Self::EdgeCurve {
                start, end, curve, ..
            } => vec![*start, *end, *curve],
            Self::OrientedEdge { edge, .. } => vec![*edge],
            Self::EdgeLoop(ids) | Self::PolyLoop(ids) => ids.clone(),
            Self::FaceBound { bound, .. } => vec![*bound],
            Self::Face {
                bounds, surface, ..
            } => bounds.iter().copied().chain(std::iter::once(*surface)).collect(),
        }
    }

    /// Whether this is a face entity.
    pub const fn is_face(&self) -> bool {
        matches!(self, Self::Face { .. })
    }
}

/// Positional access to an instance's parameters.
struct Params<'a>(&'a [Param]);

impl Params<'_> {
    fn get(&self, index: usize) -> Result<&Param, String> {
        self.0
            .get(index)
            .ok_or_else(|| format!("missing parameter {}", index + 1))
    }

    fn reference(&self, index: usize) -> Result<EntityId, String> {
        match self.get(index)? {
            Param::Ref(id) => Ok(*id),
            other => Err(format!(
                "parameter {} should be a reference, found {other:?}",
                index + 1
            )),
        }
    }

    fn optional_reference(&self, index: usize) -> Result<Option<EntityId>, String> {
        match self.0.get(index) {
            None | Some(Param::Unset | Param::Derived) => Ok(None),
            Some(_) => self.reference(index).map(Some),
        }
    }

    fn references(&self, index: usize) -> Result<Vec<EntityId>, String> {
        match self.get(index)? {
            Param::List(items) => items
                .iter()
                .map(|item| match item {
                    Param::Ref(id) => Ok(*id),
                    other => Err(format!("expected a reference in list, found {other:?}")),
                })
                .collect(),
            other => Err(format!(
                "parameter {} should be a list, found {other:?}",
                index + 1
            )),
        }
    }

    fn real(&self, index: usize) -> Result<f64, String> {
        as_real(self.get(index)?)
            .ok_or_else(|| format!("parameter {} should be a number", index + 1))
    }

    fn boolean(&self, index: usize) -> Result<bool, String> {
        match self.get(index)? {
            Param::Enum(value) if value == "T" || value == "TRUE" => Ok(true),
            Param::Enum(value) if value == "F" || value == "FALSE" => Ok(false),
            other => Err(format!(
                "parameter {} should be .T. or .F., found {other:?}",
                index + 1
            )),
        }
    }

    fn coordinates(&self, index: usize) -> Result<Vector3<f64>, String> {
        let Param::List(items) = self.get(index)? else {
            return Err(format!("parameter {} should be a coordinate list", index + 1));
        };
        let values = items
            .iter()
            .map(as_real)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| "non-numeric coordinate".to_string())?;
        match values.as_slice() {
            [x, y] => Ok(Vector3::new(*x, *y, 0.0)),
            [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
            _ => Err(format!("expected 2 or 3 coordinates, found {}", values.len())),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_real(param: &Param) -> Option<f64> {
    match param {
        Param::Real(v) => Some(*v),
        Param::Int(v) => Some(*v as f64),
        Param::Typed(_, inner) if inner.len() == 1 => as_real(&inner[0]),
        _ => None,
    }
}

/// The id -> entity arena of one DATA section.
#[derive(Debug, Default)]
pub struct EntityTable {
    entities: HashMap<EntityId, Entity>,
    faces: Vec<EntityId>,
}

impl EntityTable {
    pub fn insert(&mut self, id: EntityId, entity: Entity) -> bool {
        if entity.is_face() {
            self.faces.push(id);
        }
        self.entities.insert(id, entity).is_none()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Face ids in file order.
    pub fn faces(&self) -> &[EntityId] {
        &self.faces
    }

    /// Walk breadth-first from `root` and return the first id that is
    /// referenced but not defined, if any.
    ///
    /// Each id is visited once, so reference cycles terminate.
    pub fn first_unresolved(&self, root: EntityId) -> Option<(EntityId, EntityId)> {
        let mut queue = VecDeque::from([root]);
        let mut seen: HashSet<EntityId> = HashSet::new();
        seen.insert(root);
        while let Some(id) = queue.pop_front() {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            for child in entity.references() {
                if !self.entities.contains_key(&child) {
                    return Some((id, child));
                }
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        None
    }
}
