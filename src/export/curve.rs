//! Spline extraction.

use super::document::{Document, Section};
use crate::scene::{CurveData, SplinePoints};
use crate::types::{format_list, xml_escape};

/// Control vertices of every spline of a curve, concatenated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplineExport {
    /// Cyclic flag of the first spline.
    pub closed: bool,
    pub points: Vec<[f32; 3]>,
    pub handles_in: Vec<[f32; 3]>,
    pub handles_out: Vec<[f32; 3]>,
    pub tilts: Vec<f32>,
    pub interpolations: Vec<&'static str>,
}

impl SplineExport {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Flatten a curve into control vertices.
///
/// Bezier points keep their handles; poly points use the point itself as
/// both handles.
pub fn extract_curve(curve: &CurveData) -> SplineExport {
    let mut out = SplineExport {
        closed: curve.splines.first().is_some_and(|s| s.cyclic),
        ..Default::default()
    };

    for spline in &curve.splines {
        match &spline.points {
            SplinePoints::Bezier(points) => {
                for p in points {
                    out.points.push(p.co);
                    out.handles_in.push(p.handle_left);
                    out.handles_out.push(p.handle_right);
                    out.tilts.push(p.tilt);
                    out.interpolations.push("BEZIER");
                }
            }
            SplinePoints::Poly(points) => {
                for p in points {
                    out.points.push(p.co);
                    out.handles_in.push(p.co);
                    out.handles_out.push(p.co);
                    out.tilts.push(p.tilt);
                    out.interpolations.push("LINEAR");
                }
            }
        }
    }
    out
}

fn write_source(doc: &mut Document, id: &str, array: String, count: usize, stride: usize, param: (&str, &str)) {
    let s = Section::Geometries;
    doc.writel(s, 3, format!("<source id=\"{}\">", id));
    doc.writel(s, 4, array);
    doc.writel(s, 4, "<technique_common>");
    doc.writel(
        s,
        5,
        format!("<accessor source=\"#{}-array\" count=\"{}\" stride=\"{}\">", id, count, stride),
    );
    if stride == 3 {
        for axis in ["X", "Y", "Z"] {
            doc.writel(s, 6, format!("<param name=\"{}\" type=\"{}\"/>", axis, param.1));
        }
    } else {
        doc.writel(s, 6, format!("<param name=\"{}\" type=\"{}\"/>", param.0, param.1));
    }
    doc.writel(s, 5, "</accessor>");
    doc.writel(s, 4, "</technique_common>");
    doc.writel(s, 3, "</source>");
}

fn vec3_source(doc: &mut Document, id: &str, values: &[[f32; 3]]) {
    let array = format!(
        "<float_array id=\"{}-array\" count=\"{}\">{}</float_array>",
        id,
        values.len() * 3,
        format_list(values.iter().flatten())
    );
    write_source(doc, id, array, values.len(), 3, ("", "float"));
}

/// Write a `<geometry>` holding a `<spline>`.
pub fn write_curve(doc: &mut Document, id: &str, name: &str, spline: &SplineExport) {
    let s = Section::Geometries;
    doc.writel(s, 1, format!("<geometry id=\"{}\" name=\"{}\">", id, xml_escape(name)));
    doc.writel(s, 2, format!("<spline closed=\"{}\">", spline.closed));

    vec3_source(doc, &format!("{}-positions", id), &spline.points);
    vec3_source(doc, &format!("{}-intangents", id), &spline.handles_in);
    vec3_source(doc, &format!("{}-outtangents", id), &spline.handles_out);

    let interp_id = format!("{}-interpolations", id);
    let array = format!(
        "<Name_array id=\"{}-array\" count=\"{}\">{}</Name_array>",
        interp_id,
        spline.interpolations.len(),
        format_list(&spline.interpolations)
    );
    write_source(doc, &interp_id, array, spline.interpolations.len(), 1, ("INTERPOLATION", "name"));

    let tilt_id = format!("{}-tilts", id);
    let array = format!(
        "<float_array id=\"{}-array\" count=\"{}\">{}</float_array>",
        tilt_id,
        spline.tilts.len(),
        format_list(&spline.tilts)
    );
    write_source(doc, &tilt_id, array, spline.tilts.len(), 1, ("TILT", "float"));

    doc.writel(s, 3, "<control_vertices>");
    for (semantic, suffix) in [
        ("POSITION", "positions"),
        ("IN_TANGENT", "intangents"),
        ("OUT_TANGENT", "outtangents"),
        ("INTERPOLATION", "interpolations"),
        ("TILT", "tilts"),
    ] {
        doc.writel(s, 4, format!("<input semantic=\"{}\" source=\"#{}-{}\"/>", semantic, id, suffix));
    }
    doc.writel(s, 3, "</control_vertices>");

    doc.writel(s, 2, "</spline>");
    doc.writel(s, 1, "</geometry>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{BezierPoint, CurvePoint, Spline};

    fn sample_curve() -> CurveData {
        CurveData {
            name: "Path".to_string(),
            splines: vec![
                Spline {
                    points: SplinePoints::Bezier(vec![BezierPoint {
                        co: [0.0, 0.0, 0.0],
                        handle_left: [-1.0, 0.0, 0.0],
                        handle_right: [1.0, 0.0, 0.0],
                        tilt: 0.5,
                    }]),
                    cyclic: true,
                },
                Spline {
                    points: SplinePoints::Poly(vec![CurvePoint {
                        co: [2.0, 3.0, 4.0],
                        tilt: 0.0,
                    }]),
                    cyclic: false,
                },
            ],
        }
    }

    #[test]
    fn test_extract_bezier_and_poly() {
        let spline = extract_curve(&sample_curve());
        assert!(spline.closed);
        assert_eq!(spline.len(), 2);
        assert_eq!(spline.handles_in[0], [-1.0, 0.0, 0.0]);
        // Poly handles coincide with the point.
        assert_eq!(spline.handles_in[1], [2.0, 3.0, 4.0]);
        assert_eq!(spline.handles_out[1], [2.0, 3.0, 4.0]);
        assert_eq!(spline.interpolations, vec!["BEZIER", "LINEAR"]);
    }

    #[test]
    fn test_write_curve_control_vertices() {
        let spline = extract_curve(&sample_curve());
        let mut doc = Document::new();
        write_curve(&mut doc, "id-spline-1", "Path", &spline);
        let text = doc.lines(Section::Geometries).join("\n");

        assert!(text.contains("<spline closed=\"true\">"));
        assert!(text.contains("<float_array id=\"id-spline-1-positions-array\" count=\"6\">0 0 0 2 3 4</float_array>"));
        assert!(text.contains("<Name_array id=\"id-spline-1-interpolations-array\" count=\"2\">BEZIER LINEAR</Name_array>"));
        assert!(text.contains("<input semantic=\"TILT\" source=\"#id-spline-1-tilts\"/>"));
    }
}
