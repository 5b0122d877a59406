use crate::error::Error;
use crate::math::{Aabb, Point3};
use crate::scene::{CameraDesc, Hittable, Material};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One node of the flat scene encoding. Geometry carries its material inline;
/// BVH nodes reference their children by index into the node list and carry
/// their bounding box verbatim — the decoder never rebuilds the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlatNode {
    Sphere {
        center: Point3,
        radius: f64,
        material: Material,
    },
    Cylinder {
        p1: Point3,
        p2: Point3,
        radius: f64,
        material: Material,
    },
    Bvh {
        left: u32,
        right: u32,
        bbox: Aabb,
    },
}

/// The wire form of a scene: an ordered node list, the root's index, and the
/// camera description. Shared subgraphs are encoded once and referenced by
/// index, so the DAG survives the flattening.
///
/// Nodes are appended in post-order — children strictly before their parent —
/// which gives the invariant `child index < parent index`. The decoder leans
/// on it: a single ascending pass materializes every child before the node
/// that references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatScene {
    pub nodes: Vec<FlatNode>,
    pub root: Option<u32>,
    pub camera: CameraDesc,
}

/// Flattens a scene graph, memoizing on node identity so a handle reachable
/// through several parents is encoded exactly once. An empty scene (no root)
/// encodes as an empty node list.
pub fn serialize_scene(
    root: Option<&Arc<Hittable>>,
    camera: &CameraDesc,
) -> Result<FlatScene, Error> {
    let mut nodes = Vec::new();
    let mut memo: HashMap<*const Hittable, u32> = HashMap::new();
    let root = match root {
        Some(node) => Some(serialize_node(node, &mut nodes, &mut memo)?),
        None => None,
    };
    Ok(FlatScene {
        nodes,
        root,
        camera: *camera,
    })
}

fn serialize_node(
    node: &Arc<Hittable>,
    nodes: &mut Vec<FlatNode>,
    memo: &mut HashMap<*const Hittable, u32>,
) -> Result<u32, Error> {
    let key = Arc::as_ptr(node);
    if let Some(&index) = memo.get(&key) {
        return Ok(index);
    }

    let flat = match &**node {
        Hittable::Sphere {
            center,
            radius,
            material,
        } => FlatNode::Sphere {
            center: *center,
            radius: *radius,
            material: material.clone(),
        },
        Hittable::Cylinder {
            p1,
            p2,
            radius,
            material,
        } => FlatNode::Cylinder {
            p1: *p1,
            p2: *p2,
            radius: *radius,
            material: material.clone(),
        },
        Hittable::Bvh { left, right, bbox } => {
            let left = serialize_node(left, nodes, memo)?;
            let right = serialize_node(right, nodes, memo)?;
            FlatNode::Bvh {
                left,
                right,
                bbox: *bbox,
            }
        }
        Hittable::List(_) => {
            return Err(Error::Fatal(
                "hittable lists have no wire tag; wrap the scene in a BVH before serializing"
                    .into(),
            ))
        }
    };

    nodes.push(flat);
    let index = (nodes.len() - 1) as u32;
    memo.insert(key, index);
    Ok(index)
}

/// Reconstructs the scene graph from its flat form, restoring sharing: a node
/// referenced by several parents comes back as one allocation with several
/// handles. Malformed input (dangling or out-of-order child indices) is fatal.
pub fn deserialize_scene(flat: &FlatScene) -> Result<Option<Arc<Hittable>>, Error> {
    let mut slots: Vec<Arc<Hittable>> = Vec::with_capacity(flat.nodes.len());

    for (index, node) in flat.nodes.iter().enumerate() {
        let rebuilt = match node {
            FlatNode::Sphere {
                center,
                radius,
                material,
            } => Hittable::Sphere {
                center: *center,
                radius: *radius,
                material: material.clone(),
            },
            FlatNode::Cylinder {
                p1,
                p2,
                radius,
                material,
            } => Hittable::Cylinder {
                p1: *p1,
                p2: *p2,
                radius: *radius,
                material: material.clone(),
            },
            FlatNode::Bvh { left, right, bbox } => {
                let fetch = |child: u32| -> Result<Arc<Hittable>, Error> {
                    if (child as usize) >= index {
                        return Err(Error::Fatal(format!(
                            "bvh node {index} references child {child} at or above itself"
                        )));
                    }
                    Ok(slots[child as usize].clone())
                };
                Hittable::Bvh {
                    left: fetch(*left)?,
                    right: fetch(*right)?,
                    bbox: *bbox,
                }
            }
        };
        slots.push(Arc::new(rebuilt));
    }

    match flat.root {
        None => Ok(None),
        Some(root) => slots
            .get(root as usize)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::Fatal(format!("root index {root} out of bounds"))),
    }
}

/// Scene graph + camera → bytes, the payload handed to workers at registration.
pub fn encode(root: Option<&Arc<Hittable>>, camera: &CameraDesc) -> Result<Vec<u8>, Error> {
    let flat = serialize_scene(root, camera)?;
    bincode::serialize(&flat).map_err(|e| Error::Fatal(format!("scene encode failed: {e}")))
}

/// Bytes → reconstructed scene graph + camera.
pub fn decode(bytes: &[u8]) -> Result<(Option<Arc<Hittable>>, CameraDesc), Error> {
    let flat: FlatScene = bincode::deserialize(bytes)
        .map_err(|e| Error::Fatal(format!("scene decode failed: {e}")))?;
    let root = deserialize_scene(&flat)?;
    Ok((root, flat.camera))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::*;
    use crate::scene::build_bvh;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn gray() -> Material {
        Material::Lambertian {
            albedo: Color::new(0.5, 0.5, 0.5),
        }
    }

    fn bvh_over(left: &Arc<Hittable>, right: &Arc<Hittable>) -> Arc<Hittable> {
        let bbox = Aabb::surrounding(&left.bounding_box(), &right.bounding_box());
        Arc::new(Hittable::Bvh {
            left: left.clone(),
            right: right.clone(),
            bbox,
        })
    }

    #[test]
    fn children_are_encoded_before_parents() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut objects: Vec<Arc<Hittable>> = (0..17)
            .map(|_| {
                Hittable::sphere(
                    Point3::new(
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-5.0..5.0),
                    ),
                    0.5,
                    gray(),
                )
            })
            .collect();
        let root = build_bvh(&mut objects);
        let flat = serialize_scene(Some(&root), &CameraDesc::default()).unwrap();

        for (index, node) in flat.nodes.iter().enumerate() {
            if let FlatNode::Bvh { left, right, .. } = node {
                assert!((*left as usize) < index);
                assert!((*right as usize) < index);
            }
        }
        // Post-order puts the root last.
        assert_eq!(flat.root, Some((flat.nodes.len() - 1) as u32));
    }

    #[test]
    fn shared_leaf_is_encoded_once_and_sharing_restored() {
        let leaf = Hittable::sphere(Point3::zero(), 1.0, gray());
        let spare = Hittable::sphere(Point3::new(3.0, 0.0, 0.0), 1.0, gray());
        // Two distinct branches both holding the same leaf handle.
        let branch_a = bvh_over(&leaf, &spare);
        let branch_b = bvh_over(&leaf, &leaf);
        let root = bvh_over(&branch_a, &branch_b);

        let flat = serialize_scene(Some(&root), &CameraDesc::default()).unwrap();
        let spheres = flat
            .nodes
            .iter()
            .filter(|n| matches!(n, FlatNode::Sphere { .. }))
            .count();
        assert_eq!(spheres, 2, "the shared leaf must appear exactly once");
        assert_eq!(flat.nodes.len(), 5);

        let rebuilt = deserialize_scene(&flat).unwrap().unwrap();
        let Hittable::Bvh { left, right, .. } = &*rebuilt else {
            panic!("root must be a bvh");
        };
        let (Hittable::Bvh { left: a_leaf, .. }, Hittable::Bvh { left: b_leaf, .. }) =
            (&**left, &**right)
        else {
            panic!("branches must be bvh nodes");
        };
        assert!(
            Arc::ptr_eq(a_leaf, b_leaf),
            "both parents must share one rebuilt leaf"
        );
    }

    #[test]
    fn single_object_bvh_round_trips_the_duplicate_reference() {
        let mut objects = vec![Hittable::sphere(Point3::zero(), 1.0, gray())];
        let root = build_bvh(&mut objects);
        let flat = serialize_scene(Some(&root), &CameraDesc::default()).unwrap();
        assert_eq!(flat.nodes.len(), 2);

        let rebuilt = deserialize_scene(&flat).unwrap().unwrap();
        let Hittable::Bvh { left, right, .. } = &*rebuilt else {
            panic!("root must be a bvh");
        };
        assert!(Arc::ptr_eq(left, right));
    }

    #[test]
    fn round_trip_yields_bitwise_identical_hits() {
        let mut rng = SmallRng::seed_from_u64(99);
        let mut objects: Vec<Arc<Hittable>> = Vec::new();
        for _ in 0..12 {
            let center = Point3::new(
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-6.0..-2.0),
            );
            objects.push(Hittable::sphere(center, rng.gen_range(0.3..1.0), gray()));
        }
        objects.push(Hittable::cylinder(
            Point3::new(-1.0, -2.0, -4.0),
            Point3::new(1.0, 2.0, -4.0),
            0.75,
            Material::Metal {
                albedo: Color::new(0.9, 0.9, 0.9),
                fuzz: 0.05,
            },
        ));

        let root = build_bvh(&mut objects);
        let camera = CameraDesc::default();
        let bytes = encode(Some(&root), &camera).unwrap();
        let (rebuilt, camera_back) = decode(&bytes).unwrap();
        let rebuilt = rebuilt.unwrap();
        assert_eq!(camera_back, camera);

        for k in 0..100u32 {
            let angle = f64::from(k) * 0.063;
            let ray = Ray::new(
                Point3::new(angle.cos() * 0.5, angle.sin() * 0.5, 2.0),
                Vec3::new(angle.sin() * 0.3, angle.cos() * 0.3, -1.0),
            );
            let t = Interval::new(0.005, f64::INFINITY);
            match (root.hit(&ray, t), rebuilt.hit(&ray, t)) {
                (Some(a), Some(b)) => {
                    assert_eq!(a.t, b.t, "hit parameter must be bitwise identical");
                    assert_eq!(a.point, b.point);
                    assert_eq!(a.normal, b.normal);
                }
                (None, None) => {}
                (a, b) => panic!(
                    "round-trip hit disagreement: {:?} vs {:?}",
                    a.map(|r| r.t),
                    b.map(|r| r.t)
                ),
            }
        }
    }

    #[test]
    fn empty_scene_encodes_to_no_nodes() {
        let bytes = encode(None, &CameraDesc::default()).unwrap();
        let (root, _) = decode(&bytes).unwrap();
        assert!(root.is_none());
    }

    #[test]
    fn lists_are_rejected() {
        let list = Arc::new(Hittable::List(vec![Hittable::sphere(
            Point3::zero(),
            1.0,
            gray(),
        )]));
        let err = serialize_scene(Some(&list), &CameraDesc::default()).unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
    }

    #[test]
    fn forward_child_references_are_fatal() {
        let flat = FlatScene {
            nodes: vec![FlatNode::Bvh {
                left: 0,
                right: 0,
                bbox: Aabb::new(Point3::zero(), Point3::ones()),
            }],
            root: Some(0),
            camera: CameraDesc::default(),
        };
        assert!(matches!(
            deserialize_scene(&flat),
            Err(Error::Fatal(_))
        ));
    }
}
