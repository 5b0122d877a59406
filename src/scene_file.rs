use crate::error::Error;
use crate::math::*;
use crate::scene::{CameraDesc, Hittable, Material, Scene};
use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads a scene from the whitespace-separated, line-oriented text format.
///
/// Statements, one per line:
/// ```text
/// material <name> lambertian R G B
/// material <name> metal R G B fuzz
/// material <name> dielectric ior
/// material <name> diffuse_light R G B
/// sphere cx cy cz radius <material_name>
/// cylinder p1x p1y p1z p2x p2y p2z radius <material_name>
/// camera
///   position x y z
///   look_at x y z
///   up x y z
///   vfov deg
/// end
/// ```
/// Malformed or unknown lines are warned about and skipped; geometry naming
/// an undefined material is skipped too. Only I/O failures are hard errors.
pub fn load_scene(path: &Path) -> Result<Scene, Error> {
    let file = File::open(path)?;
    parse_scene(BufReader::new(file))
}

pub fn parse_scene<R: BufRead>(input: R) -> Result<Scene, Error> {
    let mut scene = Scene::default();
    let mut materials: HashMap<String, Material> = HashMap::new();
    let mut lines = input.lines();

    while let Some(line) = lines.next() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(statement) = tokens.next() else {
            continue;
        };

        match statement {
            "material" => parse_material(&line, &mut tokens, &mut materials),
            "sphere" => {
                let Some(([cx, cy, cz, radius], material)) =
                    parse_geometry(&mut tokens, &materials)
                else {
                    warn!("malformed or unresolvable sphere, skipping line: {line}");
                    continue;
                };
                scene.objects.push(Hittable::sphere(
                    Point3::new(cx, cy, cz),
                    radius,
                    material,
                ));
            }
            "cylinder" => {
                let Some(([p1x, p1y, p1z, p2x, p2y, p2z, radius], material)) =
                    parse_geometry(&mut tokens, &materials)
                else {
                    warn!("malformed or unresolvable cylinder, skipping line: {line}");
                    continue;
                };
                scene.objects.push(Hittable::cylinder(
                    Point3::new(p1x, p1y, p1z),
                    Point3::new(p2x, p2y, p2z),
                    radius,
                    material,
                ));
            }
            "camera" => parse_camera_block(&mut lines, &mut scene.camera)?,
            other => warn!("unknown statement '{other}', skipping line: {line}"),
        }
    }

    Ok(scene)
}

fn parse_material<'a>(
    line: &str,
    tokens: &mut impl Iterator<Item = &'a str>,
    materials: &mut HashMap<String, Material>,
) {
    let (Some(name), Some(kind)) = (tokens.next(), tokens.next()) else {
        warn!("malformed material definition, skipping line: {line}");
        return;
    };

    let material = match kind {
        "lambertian" => parse_numbers::<3>(&mut *tokens).map(|[r, g, b]| Material::Lambertian {
            albedo: Color::new(r, g, b),
        }),
        "metal" => parse_numbers::<4>(&mut *tokens).map(|[r, g, b, fuzz]| Material::Metal {
            albedo: Color::new(r, g, b),
            fuzz,
        }),
        "dielectric" => parse_numbers::<1>(&mut *tokens).map(|[ior]| Material::Dielectric { ior }),
        "diffuse_light" => {
            parse_numbers::<3>(&mut *tokens).map(|[r, g, b]| Material::DiffuseLight {
                emit: Color::new(r, g, b),
            })
        }
        other => {
            warn!("unknown material type '{other}' for material '{name}'");
            return;
        }
    };

    match material {
        Some(material) => {
            materials.insert(name.to_string(), material);
        }
        None => warn!("invalid {kind} material '{name}', skipping"),
    }
}

/// Parses the numeric fields of a geometry statement followed by its material
/// name; `None` if any field is missing, malformed, or the material unknown.
fn parse_geometry<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
    materials: &HashMap<String, Material>,
) -> Option<([f64; N], Material)> {
    let numbers = parse_numbers::<N>(&mut *tokens)?;
    let name = tokens.next()?;
    let Some(material) = materials.get(name) else {
        warn!("material '{name}' is not defined");
        return None;
    };
    Some((numbers, material.clone()))
}

fn parse_numbers<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    for slot in &mut out {
        *slot = tokens.next()?.parse().ok()?;
    }
    Some(out)
}

/// Consumes lines until `end`, applying recognized camera keys.
fn parse_camera_block(
    lines: &mut impl Iterator<Item = std::io::Result<String>>,
    camera: &mut CameraDesc,
) -> Result<(), Error> {
    for line in lines {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            continue;
        };
        match key {
            "end" => return Ok(()),
            "position" => {
                if let Some([x, y, z]) = parse_numbers::<3>(&mut tokens) {
                    camera.position = Point3::new(x, y, z);
                }
            }
            "look_at" => {
                if let Some([x, y, z]) = parse_numbers::<3>(&mut tokens) {
                    camera.look_at = Point3::new(x, y, z);
                }
            }
            "up" => {
                if let Some([x, y, z]) = parse_numbers::<3>(&mut tokens) {
                    camera.up = Vec3::new(x, y, z);
                }
            }
            "vfov" => {
                if let Some([v]) = parse_numbers::<1>(&mut tokens) {
                    camera.vfov = v;
                }
            }
            other => warn!("unknown camera key '{other}', skipping"),
        }
    }
    Ok(())
}
