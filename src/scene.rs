use crate::math::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

// ─── Hit Record ─────────────────────────────────────────────────────────────

pub struct HitRecord<'a> {
    pub point: Point3,
    pub normal: Vec3,
    pub t: f64,
    pub front_face: bool,
    pub material: &'a Material,
}

impl<'a> HitRecord<'a> {
    pub fn set_face_normal(&mut self, ray: &Ray, outward_normal: Vec3) {
        self.front_face = ray.direction.dot(outward_normal) < 0.0;
        self.normal = if self.front_face {
            outward_normal
        } else {
            -outward_normal
        };
    }
}

// ─── Materials ──────────────────────────────────────────────────────────────

/// Glass is not perfectly clear here: each bounce absorbs 5%.
const DIELECTRIC_ATTENUATION: Color = Color::new(0.95, 0.95, 0.95);

/// The material BRDF abstraction. A closed set of known surface models, so
/// dispatch is a plain match and the whole thing serializes for scene transfer
/// without any registry indirection. Sampling goes through `&mut dyn RngCore`
/// so callers can hand in whatever seeded generator they own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Material {
    Lambertian { albedo: Color },
    Metal { albedo: Color, fuzz: f64 },
    Dielectric { ior: f64 },
    DiffuseLight { emit: Color },
}

impl Material {
    /// Importance-samples the BRDF lobe at a hit point. Returns the scattered
    /// ray and its attenuation, or `None` when the sample is absorbed
    /// (emissive surfaces, below-surface metal reflections).
    pub fn scatter(
        &self,
        ray: &Ray,
        hit: &HitRecord,
        rng: &mut dyn rand::RngCore,
    ) -> Option<(Ray, Color)> {
        match self {
            Material::Lambertian { albedo } => {
                let mut scatter_dir = hit.normal + Vec3::random_in_hemisphere(hit.normal, rng);
                if scatter_dir.near_zero() {
                    scatter_dir = hit.normal;
                }
                Some((Ray::new(hit.point, scatter_dir), *albedo))
            }
            Material::Metal { albedo, fuzz } => {
                let reflected = ray.direction.normalized().reflect(hit.normal);
                let scattered = Ray::new(
                    hit.point,
                    reflected + Vec3::random_in_unit_sphere(rng) * fuzz.min(1.0),
                );
                if scattered.direction.dot(hit.normal) > 0.0 {
                    Some((scattered, *albedo))
                } else {
                    None
                }
            }
            Material::Dielectric { ior } => {
                let eta_ratio = if hit.front_face { 1.0 / ior } else { *ior };
                let unit_dir = ray.direction.normalized();
                let cos_theta = (-unit_dir).dot(hit.normal).min(1.0);
                let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

                let cannot_refract = eta_ratio * sin_theta > 1.0;
                let direction =
                    if cannot_refract || schlick_reflectance(cos_theta, eta_ratio) > rng.gen() {
                        unit_dir.reflect(hit.normal)
                    } else {
                        unit_dir
                            .refract(hit.normal, eta_ratio)
                            .unwrap_or_else(|| unit_dir.reflect(hit.normal))
                    };

                Some((Ray::new(hit.point, direction), DIELECTRIC_ATTENUATION))
            }
            Material::DiffuseLight { .. } => None,
        }
    }

    pub fn emitted(&self) -> Color {
        match self {
            Material::DiffuseLight { emit } => *emit,
            _ => Color::zero(),
        }
    }
}

fn schlick_reflectance(cosine: f64, ref_idx: f64) -> f64 {
    let r0 = ((1.0 - ref_idx) / (1.0 + ref_idx)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
}

// ─── Hittable ───────────────────────────────────────────────────────────────

/// Everything a ray can intersect. Like `Material` this is a closed set: the
/// scene graph is built from exactly these variants, which keeps serialization
/// honest (each variant has a wire tag) and makes traversal a match.
///
/// Nodes are shared through `Arc` — the BVH builder duplicates a handle when a
/// subtree holds a single object, so the graph is a DAG, never a tree by fiat.
#[derive(Debug)]
pub enum Hittable {
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
        left: Arc<Hittable>,
        right: Arc<Hittable>,
        bbox: Aabb,
    },
    List(Vec<Arc<Hittable>>),
}

impl Hittable {
    /// Radius is clamped non-negative at construction.
    pub fn sphere(center: Point3, radius: f64, material: Material) -> Arc<Hittable> {
        Arc::new(Hittable::Sphere {
            center,
            radius: radius.max(0.0),
            material,
        })
    }

    /// Finite capped cylinder between `p1` and `p2`. Radius is clamped
    /// non-negative, same as for spheres.
    pub fn cylinder(p1: Point3, p2: Point3, radius: f64, material: Material) -> Arc<Hittable> {
        Arc::new(Hittable::Cylinder {
            p1,
            p2,
            radius: radius.max(0.0),
            material,
        })
    }

    pub fn hit(&self, ray: &Ray, t: Interval) -> Option<HitRecord<'_>> {
        match self {
            Hittable::Sphere {
                center,
                radius,
                material,
            } => hit_sphere(*center, *radius, material, ray, t),
            Hittable::Cylinder {
                p1,
                p2,
                radius,
                material,
            } => hit_cylinder(*p1, *p2, *radius, material, ray, t),
            Hittable::Bvh { left, right, bbox } => {
                if !bbox.hit(ray, t) {
                    return None;
                }
                let hit_left = left.hit(ray, t);
                let far = hit_left.as_ref().map_or(t.max, |h| h.t);
                let hit_right = right.hit(ray, Interval::new(t.min, far));
                hit_right.or(hit_left)
            }
            Hittable::List(objects) => {
                let mut closest = t.max;
                let mut best = None;
                for object in objects {
                    if let Some(rec) = object.hit(ray, Interval::new(t.min, closest)) {
                        closest = rec.t;
                        best = Some(rec);
                    }
                }
                best
            }
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match self {
            Hittable::Sphere { center, radius, .. } => {
                let r = Vec3::new(*radius, *radius, *radius);
                Aabb::new(*center - r, *center + r)
            }
            // Conservative: the union of radius-cubes at both end points.
            Hittable::Cylinder { p1, p2, radius, .. } => {
                let r = Vec3::new(*radius, *radius, *radius);
                Aabb::surrounding(&Aabb::new(*p1 - r, *p1 + r), &Aabb::new(*p2 - r, *p2 + r))
            }
            Hittable::Bvh { bbox, .. } => *bbox,
            Hittable::List(objects) => objects
                .iter()
                .map(|o| o.bounding_box())
                .reduce(|a, b| Aabb::surrounding(&a, &b))
                .unwrap_or(Aabb::new(Point3::zero(), Point3::zero())),
        }
    }
}

// ─── Sphere intersection ────────────────────────────────────────────────────

fn hit_sphere<'a>(
    center: Point3,
    radius: f64,
    material: &'a Material,
    ray: &Ray,
    t: Interval,
) -> Option<HitRecord<'a>> {
    let oc = ray.origin - center;
    let a = ray.direction.length_squared();
    let half_b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = half_b * half_b - a * c;

    if discriminant < 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();
    let mut root = (-half_b - sqrtd) / a;
    if !t.surrounds(root) {
        root = (-half_b + sqrtd) / a;
        if !t.surrounds(root) {
            return None;
        }
    }

    let point = ray.at(root);
    let outward_normal = (point - center) / radius;
    let mut rec = HitRecord {
        point,
        normal: outward_normal,
        t: root,
        front_face: true,
        material,
    };
    rec.set_face_normal(ray, outward_normal);
    Some(rec)
}

// ─── Cylinder intersection ──────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum CylinderPart {
    Body,
    BottomCap,
    TopCap,
}

/// Finite capped cylinder: quadratic against the infinite body (components
/// perpendicular to the axis), accepting roots whose projected height lies
/// within the segment, plus plane tests against the two disc caps. The
/// smallest accepted parameter across body and caps wins.
fn hit_cylinder<'a>(
    p1: Point3,
    p2: Point3,
    radius: f64,
    material: &'a Material,
    ray: &Ray,
    t: Interval,
) -> Option<HitRecord<'a>> {
    let axis = p2 - p1;
    let axis_len = axis.length();
    if axis_len < 1e-12 {
        return None;
    }
    let ahat = axis / axis_len;
    let oc = ray.origin - p1;
    let rd = ray.direction;

    let rd_a = rd.dot(ahat);
    let oc_a = oc.dot(ahat);

    let mut best: Option<(f64, CylinderPart)> = None;

    // Infinite body, then clip against the segment height.
    let a = rd.length_squared() - rd_a * rd_a;
    if a.abs() > 1e-12 {
        let half_b = rd.dot(oc) - rd_a * oc_a;
        let c = oc.length_squared() - oc_a * oc_a - radius * radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant >= 0.0 {
            let sqrtd = discriminant.sqrt();
            for root in [(-half_b - sqrtd) / a, (-half_b + sqrtd) / a] {
                if t.surrounds(root) {
                    let height = (ray.at(root) - p1).dot(ahat);
                    if (0.0..=axis_len).contains(&height) {
                        best = Some((root, CylinderPart::Body));
                        break;
                    }
                }
            }
        }
    }

    // Disc caps: planes through p1 (normal -â) and p2 (normal +â).
    for (cap_center, cap_normal, part) in [
        (p1, -ahat, CylinderPart::BottomCap),
        (p2, ahat, CylinderPart::TopCap),
    ] {
        let denom = rd.dot(cap_normal);
        if denom.abs() < 1e-8 {
            continue;
        }
        let t_cap = (cap_center - ray.origin).dot(cap_normal) / denom;
        if !t.surrounds(t_cap) {
            continue;
        }
        if (ray.at(t_cap) - cap_center).length_squared() > radius * radius {
            continue;
        }
        if best.map_or(true, |(t_best, _)| t_cap < t_best) {
            best = Some((t_cap, part));
        }
    }

    let (t_final, part) = best?;
    let point = ray.at(t_final);
    let outward_normal = match part {
        CylinderPart::Body => {
            let height = (point - p1).dot(ahat);
            (point - p1 - ahat * height).normalized()
        }
        CylinderPart::BottomCap => -ahat,
        CylinderPart::TopCap => ahat,
    };

    let mut rec = HitRecord {
        point,
        normal: outward_normal,
        t: t_final,
        front_face: true,
        material,
    };
    rec.set_face_normal(ray, outward_normal);
    Some(rec)
}

// ─── Bounding Volume Hierarchy ──────────────────────────────────────────────

/// Builds a BVH over the objects via top-down median split on the longest axis
/// of the enclosing box. A single object becomes a node whose two children are
/// the same handle, so downstream code never special-cases leaves.
pub fn build_bvh(objects: &mut [Arc<Hittable>]) -> Arc<Hittable> {
    assert!(!objects.is_empty(), "BVH: empty object list");

    let enclosing = objects
        .iter()
        .map(|o| o.bounding_box())
        .reduce(|a, b| Aabb::surrounding(&a, &b))
        .unwrap();
    let axis = enclosing.longest_axis();

    let node = match objects {
        [only] => Hittable::Bvh {
            left: only.clone(),
            right: only.clone(),
            bbox: only.bounding_box(),
        },
        [a, b] => {
            let (left, right) = if box_min(a, axis) <= box_min(b, axis) {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            let bbox = Aabb::surrounding(&left.bounding_box(), &right.bounding_box());
            Hittable::Bvh { left, right, bbox }
        }
        _ => {
            let mid = objects.len() / 2;
            objects.select_nth_unstable_by(mid, |a, b| {
                box_min(a, axis)
                    .partial_cmp(&box_min(b, axis))
                    .unwrap_or(Ordering::Equal)
            });
            let (lower, upper) = objects.split_at_mut(mid);
            let left = build_bvh(lower);
            let right = build_bvh(upper);
            let bbox = Aabb::surrounding(&left.bounding_box(), &right.bounding_box());
            Hittable::Bvh { left, right, bbox }
        }
    };

    Arc::new(node)
}

fn box_min(object: &Arc<Hittable>, axis: usize) -> f64 {
    object.bounding_box().min[axis]
}

// ─── Scene ──────────────────────────────────────────────────────────────────

/// The camera parameters that travel with the scene. The render resolution
/// does not live here — it is part of the render configuration handed to
/// workers at registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraDesc {
    pub position: Point3,
    pub look_at: Point3,
    pub up: Vec3,
    pub vfov: f64,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 1.5),
            look_at: Point3::new(0.0, 0.0, -1.0),
            up: Vec3::unit_y(),
            vfov: 45.0,
        }
    }
}

/// A parsed scene: the flat object list (pre-BVH) and the camera description.
#[derive(Debug, Default)]
pub struct Scene {
    pub objects: Vec<Arc<Hittable>>,
    pub camera: CameraDesc,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn gray() -> Material {
        Material::Lambertian {
            albedo: Color::new(0.5, 0.5, 0.5),
        }
    }

    fn unit_sphere_at_origin() -> Arc<Hittable> {
        Hittable::sphere(Point3::zero(), 1.0, gray())
    }

    #[test]
    fn sphere_hit_from_outside_is_front_face() {
        let sphere = unit_sphere_at_origin();
        let ray = Ray::new(Point3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0));
        let rec = sphere
            .hit(&ray, Interval::new(0.005, f64::INFINITY))
            .unwrap();
        assert!((rec.t - 2.0).abs() < 1e-9);
        assert!(rec.front_face);
        assert!((rec.normal - Vec3::new(0.0, 0.0, 1.0)).near_zero());
    }

    #[test]
    fn sphere_hit_from_inside_flips_normal() {
        let sphere = unit_sphere_at_origin();
        let ray = Ray::new(Point3::zero(), Vec3::new(0.0, 0.0, -1.0));
        let rec = sphere
            .hit(&ray, Interval::new(0.005, f64::INFINITY))
            .unwrap();
        assert!(!rec.front_face);
        // Stored normal must oppose the ray direction.
        assert!(rec.normal.dot(ray.direction) < 0.0);
    }

    #[test]
    fn sphere_second_root_when_first_is_behind_tmin() {
        let sphere = unit_sphere_at_origin();
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.999), Vec3::new(0.0, 0.0, -1.0));
        let rec = sphere.hit(&ray, Interval::new(0.1, f64::INFINITY)).unwrap();
        assert!((rec.t - 1.999).abs() < 1e-9);
    }

    #[test]
    fn negative_radii_are_clamped() {
        let s = Hittable::sphere(Point3::zero(), -2.0, gray());
        let c = Hittable::cylinder(Point3::zero(), Point3::new(0.0, 1.0, 0.0), -1.0, gray());
        match (&*s, &*c) {
            (Hittable::Sphere { radius: rs, .. }, Hittable::Cylinder { radius: rc, .. }) => {
                assert_eq!(*rs, 0.0);
                assert_eq!(*rc, 0.0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn cylinder_body_hit_has_radial_normal() {
        let cyl = Hittable::cylinder(
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            0.5,
            gray(),
        );
        let ray = Ray::new(Point3::new(3.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        let rec = cyl.hit(&ray, Interval::new(0.005, f64::INFINITY)).unwrap();
        assert!((rec.t - 2.5).abs() < 1e-9);
        assert!((rec.normal - Vec3::new(1.0, 0.0, 0.0)).near_zero());
    }

    #[test]
    fn cylinder_cap_hit_has_axial_normal() {
        let cyl = Hittable::cylinder(
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            0.5,
            gray(),
        );
        let ray = Ray::new(Point3::new(0.0, 3.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
        let rec = cyl.hit(&ray, Interval::new(0.005, f64::INFINITY)).unwrap();
        assert!((rec.t - 2.0).abs() < 1e-9);
        assert!((rec.normal - Vec3::unit_y()).near_zero());
    }

    #[test]
    fn cylinder_miss_beyond_segment() {
        let cyl = Hittable::cylinder(
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            0.5,
            gray(),
        );
        // Passes beside the body above the top cap.
        let ray = Ray::new(Point3::new(3.0, 2.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        assert!(cyl.hit(&ray, Interval::new(0.005, f64::INFINITY)).is_none());
    }

    #[test]
    fn lambertian_always_scatters_into_upper_hemisphere() {
        let mat = gray();
        let mut rng = SmallRng::seed_from_u64(7);
        let sphere = unit_sphere_at_origin();
        let ray = Ray::new(Point3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0));
        let rec = sphere
            .hit(&ray, Interval::new(0.005, f64::INFINITY))
            .unwrap();
        for _ in 0..64 {
            let (scattered, attenuation) = mat.scatter(&ray, &rec, &mut rng).unwrap();
            assert!(!scattered.direction.near_zero());
            assert!(scattered.direction.dot(rec.normal) > 0.0);
            assert_eq!(attenuation, Color::new(0.5, 0.5, 0.5));
        }
    }

    #[test]
    fn mirror_metal_reflects_exactly() {
        let mat = Material::Metal {
            albedo: Color::ones(),
            fuzz: 0.0,
        };
        let mut rng = SmallRng::seed_from_u64(7);
        let sphere = unit_sphere_at_origin();
        let ray = Ray::new(Point3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
        let rec = sphere
            .hit(&ray, Interval::new(0.005, f64::INFINITY))
            .unwrap();
        let (scattered, _) = mat.scatter(&ray, &rec, &mut rng).unwrap();
        assert!((scattered.direction - Vec3::unit_y()).near_zero());
    }

    #[test]
    fn dielectric_at_grazing_incidence_stays_finite() {
        let mat = Material::Dielectric { ior: 1.5 };
        let mut rng = SmallRng::seed_from_u64(11);
        let sphere = unit_sphere_at_origin();
        // Almost tangential ray clipping the top of the sphere.
        let ray = Ray::new(Point3::new(-3.0, 0.9999, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let rec = sphere
            .hit(&ray, Interval::new(0.005, f64::INFINITY))
            .unwrap();
        for _ in 0..32 {
            let (scattered, attenuation) = mat.scatter(&ray, &rec, &mut rng).unwrap();
            assert!(scattered.direction.x.is_finite());
            assert!(scattered.direction.y.is_finite());
            assert!(scattered.direction.z.is_finite());
            assert_eq!(attenuation, Color::new(0.95, 0.95, 0.95));
        }
    }

    #[test]
    fn diffuse_light_emits_and_never_scatters() {
        let mat = Material::DiffuseLight {
            emit: Color::new(4.0, 4.0, 4.0),
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let sphere = unit_sphere_at_origin();
        let ray = Ray::new(Point3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0));
        let rec = sphere
            .hit(&ray, Interval::new(0.005, f64::INFINITY))
            .unwrap();
        assert!(mat.scatter(&ray, &rec, &mut rng).is_none());
        assert_eq!(mat.emitted(), Color::new(4.0, 4.0, 4.0));
    }

    #[test]
    fn single_object_bvh_duplicates_the_handle() {
        let sphere = unit_sphere_at_origin();
        let root = build_bvh(&mut [sphere.clone()]);
        match &*root {
            Hittable::Bvh { left, right, .. } => {
                assert!(Arc::ptr_eq(left, &sphere));
                assert!(Arc::ptr_eq(left, right));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn two_object_bvh_orders_by_axis_minimum() {
        let far = Hittable::sphere(Point3::new(5.0, 0.0, 0.0), 1.0, gray());
        let near = Hittable::sphere(Point3::new(-5.0, 0.0, 0.0), 1.0, gray());
        let root = build_bvh(&mut [far.clone(), near.clone()]);
        match &*root {
            Hittable::Bvh { left, right, .. } => {
                assert!(Arc::ptr_eq(left, &near));
                assert!(Arc::ptr_eq(right, &far));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn bvh_matches_brute_force_scan() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut objects: Vec<Arc<Hittable>> = Vec::new();
        for _ in 0..40 {
            let center = Point3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            objects.push(Hittable::sphere(center, rng.gen_range(0.2..1.5), gray()));
        }
        let brute = Hittable::List(objects.clone());
        let bvh = build_bvh(&mut objects);

        for _ in 0..200 {
            let origin = Point3::new(
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
                20.0,
            );
            let direction = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..-0.1),
            );
            let ray = Ray::new(origin, direction);
            let t = Interval::new(0.005, f64::INFINITY);
            match (brute.hit(&ray, t), bvh.hit(&ray, t)) {
                (Some(a), Some(b)) => assert!(
                    (a.t - b.t).abs() < 1e-9,
                    "closest hit mismatch: {} vs {}",
                    a.t,
                    b.t
                ),
                (None, None) => {}
                (a, b) => panic!(
                    "hit disagreement: brute={:?} bvh={:?}",
                    a.map(|r| r.t),
                    b.map(|r| r.t)
                ),
            }
        }
    }

    #[test]
    fn camera_desc_defaults() {
        let desc = CameraDesc::default();
        assert_eq!(desc.position, Point3::new(0.0, 0.0, 1.5));
        assert_eq!(desc.look_at, Point3::new(0.0, 0.0, -1.0));
        assert_eq!(desc.up, Vec3::unit_y());
        assert_eq!(desc.vfov, 45.0);
    }
}
