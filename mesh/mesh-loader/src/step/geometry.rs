//! Face boundary reconstruction from the topology entities.
//!
//! Straight edges contribute their end vertices; circle edges are sampled
//! along the arc. Everything else about the underlying surface is ignored,
//! so curved faces come out as the planar polygon of their boundary.

use std::f64::consts::TAU;

use nalgebra::Vector3;

use super::entity::{Entity, EntityId, EntityTable};

/// Boundary polygons of one face, oriented so the outer loop winds
/// counter-clockwise about the outward normal.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLoops {
    pub outer: Vec<Vector3<f64>>,
    pub holes: Vec<Vec<Vector3<f64>>>,
}

impl FaceLoops {
    /// All loop points, outer first, in the order triangle indices use.
    pub fn points(&self) -> impl Iterator<Item = &Vector3<f64>> {
        self.outer.iter().chain(self.holes.iter().flatten())
    }
}

/// Coordinate frame of a circle.
struct Frame {
    origin: Vector3<f64>,
    x: Vector3<f64>,
    y: Vector3<f64>,
}

impl Frame {
    fn angle_of(&self, p: &Vector3<f64>) -> f64 {
        let d = p - self.origin;
        d.dot(&self.y).atan2(d.dot(&self.x))
    }

    fn at(&self, radius: f64, angle: f64) -> Vector3<f64> {
        self.origin + (self.x * angle.cos() + self.y * angle.sin()) * radius
    }
}

/// Looks up and interprets entities for one table.
pub struct Reconstructor<'a> {
    table: &'a EntityTable,
    curve_segments: usize,
}

impl<'a> Reconstructor<'a> {
    pub fn new(table: &'a EntityTable, curve_segments: usize) -> Self {
        Self {
            table,
            curve_segments: curve_segments.max(1),
        }
    }

    /// Reconstruct the boundary loops of a face.
    ///
    /// # Errors
    ///
    /// Returns a description when an entity has an unexpected type or a
    /// loop has no points.
    pub fn face(&self, id: EntityId) -> Result<FaceLoops, String> {
        let Entity::Face {
            bounds, same_sense, ..
        } = self.get(id)?
        else {
            return Err(format!("#{id} is not a face"));
        };
        if bounds.is_empty() {
            return Err(format!("face #{id} has no bounds"));
        }

        let outer_index = bounds
            .iter()
            .position(|&b| matches!(self.table.get(b), Some(Entity::FaceBound { outer: true, .. })))
            .unwrap_or(0);

        let mut outer = Vec::new();
        let mut holes = Vec::new();
        for (i, &bound) in bounds.iter().enumerate() {
            let mut points = self.bound(bound)?;
            if !same_sense {
                points.reverse();
            }
            if i == outer_index {
                outer = points;
            } else {
                holes.push(points);
            }
        }
        Ok(FaceLoops { outer, holes })
    }

    fn bound(&self, id: EntityId) -> Result<Vec<Vector3<f64>>, String> {
        let Entity::FaceBound {
            bound, orientation, ..
        } = self.get(id)?
        else {
            return Err(format!("#{id} is not a face bound"));
        };
        let mut points = self.polygon(*bound)?;
        if !orientation {
            points.reverse();
        }
        Ok(points)
    }

    /// Points of an edge or poly loop, without the closing duplicate.
    fn polygon(&self, id: EntityId) -> Result<Vec<Vector3<f64>>, String> {
        let mut points = match self.get(id)? {
            Entity::PolyLoop(ids) => ids
                .iter()
                .map(|&p| self.point(p))
                .collect::<Result<Vec<_>, _>>()?,
            Entity::EdgeLoop(edges) => {
                let mut points = Vec::new();
                for &edge in edges {
                    let mut run = self.oriented_edge(edge)?;
                    run.pop();
                    points.append(&mut run);
                }
                points
            }
            other => return Err(format!("#{id} is not a loop ({})", type_name(other))),
        };

        points.dedup_by(|a, b| (*a - *b).norm() <= f64::EPSILON);
        while points.len() > 1 && (points[0] - points[points.len() - 1]).norm() <= f64::EPSILON {
            points.pop();
        }
        if points.is_empty() {
            return Err(format!("loop #{id} has no points"));
        }
        Ok(points)
    }

    /// Points along an oriented edge, first and last included.
    fn oriented_edge(&self, id: EntityId) -> Result<Vec<Vector3<f64>>, String> {
        let Entity::OrientedEdge { edge, orientation } = self.get(id)? else {
            return Err(format!("#{id} is not an oriented edge"));
        };
        let Entity::EdgeCurve {
            start,
            end,
            curve,
            same_sense,
        } = self.get(*edge)?
        else {
            return Err(format!("#{edge} is not an edge curve"));
        };

        let from = self.vertex(*start)?;
        let to = self.vertex(*end)?;
        let mut points = match self.get(*curve)? {
            Entity::Circle { position, radius } => {
                let frame = self.frame(*position)?;
                self.arc(&frame, *radius, from, to, *same_sense)
            }
            _ => vec![from, to],
        };
        if !orientation {
            points.reverse();
        }
        Ok(points)
    }

    fn arc(
        &self,
        frame: &Frame,
        radius: f64,
        from: Vector3<f64>,
        to: Vector3<f64>,
        same_sense: bool,
    ) -> Vec<Vector3<f64>> {
        let a0 = frame.angle_of(&from);
        let a1 = frame.angle_of(&to);
        let closed = (from - to).norm() <= f64::EPSILON;
        let sweep = if same_sense {
            let s = (a1 - a0).rem_euclid(TAU);
            if closed || s <= f64::EPSILON {
                TAU
            } else {
                s
            }
        } else {
            let s = (a0 - a1).rem_euclid(TAU);
            if closed || s <= f64::EPSILON {
                -TAU
            } else {
                -s
            }
        };

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let segments = ((sweep.abs() / TAU) * self.curve_segments as f64)
            .ceil()
            .max(1.0) as usize;

        let mut points = Vec::with_capacity(segments + 1);
        points.push(from);
        for k in 1..segments {
            #[allow(clippy::cast_precision_loss)]
            let t = k as f64 / segments as f64;
            points.push(frame.at(radius, a0 + sweep * t));
        }
        points.push(to);
        points
    }

    fn frame(&self, id: EntityId) -> Result<Frame, String> {
        let Entity::Placement {
            location,
            axis,
            ref_direction,
        } = self.get(id)?
        else {
            return Err(format!("#{id} is not an axis placement"));
        };
        let origin = self.point(*location)?;
        let z = match axis {
            Some(a) => self.direction(*a)?,
            None => Vector3::z(),
        }
        .try_normalize(f64::EPSILON)
        .ok_or_else(|| format!("placement #{id} has a zero axis"))?;
        let hint = match ref_direction {
            Some(r) => self.direction(*r)?,
            None => Vector3::x(),
        };
        let x = (hint - z * hint.dot(&z))
            .try_normalize(f64::EPSILON)
            .or_else(|| {
                let fallback = if z.x.abs() < 0.9 {
                    Vector3::x()
                } else {
                    Vector3::y()
                };
                (fallback - z * fallback.dot(&z)).try_normalize(f64::EPSILON)
            })
            .ok_or_else(|| format!("placement #{id} has no reference direction"))?;
        let y = z.cross(&x);
        Ok(Frame { origin, x, y })
    }

    fn vertex(&self, id: EntityId) -> Result<Vector3<f64>, String> {
        match self.get(id)? {
            Entity::VertexPoint(p) => self.point(*p),
            other => Err(format!("#{id} is not a vertex ({})", type_name(other))),
        }
    }

    fn point(&self, id: EntityId) -> Result<Vector3<f64>, String> {
        match self.get(id)? {
            Entity::Point(p) => Ok(*p),
            other => Err(format!("#{id} is not a point ({})", type_name(other))),
        }
    }

    fn direction(&self, id: EntityId) -> Result<Vector3<f64>, String> {
        match self.get(id)? {
            Entity::Direction(d) => Ok(*d),
            other => Err(format!("#{id} is not a direction ({})", type_name(other))),
        }
    }

    fn get(&self, id: EntityId) -> Result<&'a Entity, String> {
        self.table
            .get(id)
            .ok_or_else(|| format!("#{id} is not defined"))
    }
}

fn type_name(entity: &Entity) -> &str {
    match entity {
        Entity::Point(_) => "CARTESIAN_POINT",
        Entity::Direction(_) => "DIRECTION",
        Entity::Vector { .. } => "VECTOR",
        Entity::Placement { .. } => "AXIS2_PLACEMENT_3D",
        Entity::Plane { .. } => "PLANE",
        Entity::Line { .. } => "LINE",
        Entity::Circle { .. } => "CIRCLE",
        Entity::VertexPoint(_) => "VERTEX_POINT",
        Entity::EdgeCurve { .. } => "EDGE_CURVE",
        Entity::OrientedEdge { .. } => "ORIENTED_EDGE",
        Entity::EdgeLoop(_) => "EDGE_LOOP",
        Entity::PolyLoop(_) => "POLY_LOOP",
        Entity::FaceBound { .. } => "FACE_BOUND",
        Entity::Face { .. } => "ADVANCED_FACE",
        Entity::Other(name) => name,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::step::lexer::{parse_statement, InstanceBody, Statement};
    use approx::assert_relative_eq;

    fn table(text: &str) -> EntityTable {
        let mut table = EntityTable::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let statement = parse_statement(line.trim_end_matches(';')).unwrap();
            let Statement::Instance(id, InstanceBody::Simple(name, params)) = statement else {
                panic!("not a simple instance: {line}");
            };
            table.insert(id, Entity::decode(&name, &params).unwrap());
        }
        table
    }

    const SQUARE: &str = "
        #1 = CARTESIAN_POINT('', (0., 0., 0.));
        #2 = CARTESIAN_POINT('', (1., 0., 0.));
        #3 = CARTESIAN_POINT('', (1., 1., 0.));
        #4 = CARTESIAN_POINT('', (0., 1., 0.));
        #11 = VERTEX_POINT('', #1);
        #12 = VERTEX_POINT('', #2);
        #13 = VERTEX_POINT('', #3);
        #14 = VERTEX_POINT('', #4);
        #21 = EDGE_CURVE('', #11, #12, #90, .T.);
        #22 = EDGE_CURVE('', #12, #13, #90, .T.);
        #23 = EDGE_CURVE('', #13, #14, #90, .T.);
        #24 = EDGE_CURVE('', #14, #11, #90, .T.);
        #31 = ORIENTED_EDGE('', *, *, #21, .T.);
        #32 = ORIENTED_EDGE('', *, *, #22, .T.);
        #33 = ORIENTED_EDGE('', *, *, #23, .T.);
        #34 = ORIENTED_EDGE('', *, *, #24, .T.);
        #40 = EDGE_LOOP('', (#31, #32, #33, #34));
        #41 = FACE_OUTER_BOUND('', #40, .T.);
        #50 = ADVANCED_FACE('', (#41), #60, .T.);
        #51 = ADVANCED_FACE('', (#41), #60, .F.);
        #60 = PLANE('', #70);
        #70 = AXIS2_PLACEMENT_3D('', #1, $, $);
        #90 = LINE('', #1, #91);
        #91 = VECTOR('', #92, 1.);
        #92 = DIRECTION('', (1., 0., 0.));
    ";

    #[test]
    fn edge_loop_square() {
        let table = table(SQUARE);
        let loops = Reconstructor::new(&table, 24).face(50).unwrap();
        assert_eq!(
            loops.outer,
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ]
        );
        assert!(loops.holes.is_empty());
    }

    #[test]
    fn same_sense_false_reverses() {
        let table = table(SQUARE);
        let loops = Reconstructor::new(&table, 24).face(51).unwrap();
        assert_eq!(loops.outer[0], Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(loops.outer[3], Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn reversed_oriented_edges() {
        let text = format!(
            "{SQUARE}
            #35 = ORIENTED_EDGE('', *, *, #24, .F.);
            #36 = ORIENTED_EDGE('', *, *, #23, .F.);
            #37 = ORIENTED_EDGE('', *, *, #22, .F.);
            #38 = ORIENTED_EDGE('', *, *, #21, .F.);
            #42 = EDGE_LOOP('', (#35, #36, #37, #38));
            #43 = FACE_BOUND('', #42, .T.);
            #52 = ADVANCED_FACE('', (#43), #60, .T.);"
        );
        let table = table(&text);
        let loops = Reconstructor::new(&table, 24).face(52).unwrap();
        assert_eq!(
            loops.outer,
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(1.0, 1.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
            ]
        );
    }

    #[test]
    fn full_circle_edge() {
        let table = table(
            "
            #1 = CARTESIAN_POINT('', (0., 0., 0.));
            #2 = CARTESIAN_POINT('', (2., 0., 0.));
            #3 = DIRECTION('', (0., 0., 1.));
            #4 = DIRECTION('', (1., 0., 0.));
            #5 = AXIS2_PLACEMENT_3D('', #1, #3, #4);
            #6 = CIRCLE('', #5, 2.);
            #7 = VERTEX_POINT('', #2);
            #8 = EDGE_CURVE('', #7, #7, #6, .T.);
            #9 = ORIENTED_EDGE('', *, *, #8, .T.);
            #10 = EDGE_LOOP('', (#9));
            #11 = FACE_OUTER_BOUND('', #10, .T.);
            #12 = PLANE('', #5);
            #13 = ADVANCED_FACE('', (#11), #12, .T.);
            ",
        );
        let loops = Reconstructor::new(&table, 12).face(13).unwrap();
        assert_eq!(loops.outer.len(), 12);
        for p in &loops.outer {
            assert_relative_eq!(p.norm(), 2.0, epsilon = 1e-9);
        }
        // Counter-clockwise about +z.
        assert!(loops.outer[1].y > 0.0);
    }

    #[test]
    fn half_circle_against_sense() {
        let table = table(
            "
            #1 = CARTESIAN_POINT('', (0., 0., 0.));
            #2 = CARTESIAN_POINT('', (1., 0., 0.));
            #3 = CARTESIAN_POINT('', (-1., 0., 0.));
            #5 = AXIS2_PLACEMENT_3D('', #1, $, $);
            #6 = CIRCLE('', #5, 1.);
            #7 = VERTEX_POINT('', #2);
            #8 = VERTEX_POINT('', #3);
            #9 = EDGE_CURVE('', #7, #8, #6, .F.);
            #10 = ORIENTED_EDGE('', *, *, #9, .T.);
            ",
        );
        let points = Reconstructor::new(&table, 8).oriented_edge(10).unwrap();
        assert_eq!(points.len(), 5);
        assert!(points[2].y < 0.0);
        assert_relative_eq!(points[4], Vector3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn poly_loop_with_hole() {
        let table = table(
            "
            #1 = CARTESIAN_POINT('', (0., 0., 0.));
            #2 = CARTESIAN_POINT('', (4., 0., 0.));
            #3 = CARTESIAN_POINT('', (4., 4., 0.));
            #4 = CARTESIAN_POINT('', (0., 4., 0.));
            #5 = CARTESIAN_POINT('', (1., 1., 0.));
            #6 = CARTESIAN_POINT('', (3., 1., 0.));
            #7 = CARTESIAN_POINT('', (3., 3., 0.));
            #10 = POLY_LOOP('', (#1, #2, #3, #4));
            #11 = POLY_LOOP('', (#5, #6, #7));
            #12 = FACE_BOUND('', #11, .F.);
            #13 = FACE_OUTER_BOUND('', #10, .T.);
            #14 = FACE_SURFACE('', (#12, #13), #15, .T.);
            #15 = PLANE('', #16);
            #16 = AXIS2_PLACEMENT_3D('', #1, $, $);
            ",
        );
        let loops = Reconstructor::new(&table, 24).face(14).unwrap();
        assert_eq!(loops.outer.len(), 4);
        assert_eq!(loops.holes.len(), 1);
        assert_eq!(loops.holes[0][0], Vector3::new(3.0, 3.0, 0.0));
        assert_eq!(loops.points().count(), 7);
    }

    #[test]
    fn wrong_type_is_reported() {
        let table = table(
            "
            #1 = CARTESIAN_POINT('', (0., 0., 0.));
            #2 = FACE_OUTER_BOUND('', #1, .T.);
            #3 = ADVANCED_FACE('', (#2), #1, .T.);
            ",
        );
        let err = Reconstructor::new(&table, 24).face(3).unwrap_err();
        assert!(err.contains("not a loop"), "{err}");
    }
}
