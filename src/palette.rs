//! Stable per-class colours for legends and charts

/// Colour for a class name, as `#rrggbb`
///
/// The name is hashed to a hue; saturation and value are fixed so every
/// class gets an equally readable colour and the same name always maps to
/// the same colour.
///
/// # Example
/// ```
/// use frametrack::palette::class_color;
///
/// assert_eq!(class_color("Physics"), "#18dda3");
/// ```
pub fn class_color(name: &str) -> String {
    let (r, g, b) = hsv_to_rgb(name_hue(name), 0.89, 0.87);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Hue in `[0, 1)` derived from a 32-bit string hash
fn name_hue(name: &str) -> f64 {
    let mut hash: i64 = 0;
    for unit in name.encode_utf16() {
        let shifted = (hash as i32).wrapping_shl(5);
        hash = i64::from(unit) + i64::from(shifted);
    }
    let scaled = hash as f64 * 0.001;
    scaled - scaled.floor()
}

fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let sector = (hue * 6.0).floor();
    let f = hue * 6.0 - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - f * saturation);
    let t = value * (1.0 - (1.0 - f) * saturation);

    let (r, g, b) = match (sector as i64).rem_euclid(6) {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };
    (channel(r), channel(g), channel(b))
}

fn channel(component: f64) -> u8 {
    (component * 255.0).floor().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_colors() {
        assert_eq!(class_color("Physics"), "#18dda3");
        assert_eq!(class_color("Scene"), "#dd18a0");
        assert_eq!(class_color("_remaining"), "#18b4dd");
        assert_eq!(class_color("App"), "#74dd18");
    }

    #[test]
    fn test_color_is_stable_and_well_formed() {
        for name in ["", "A", "Loader", "Ünïcode"] {
            let color = class_color(name);
            assert_eq!(color, class_color(name));
            assert_eq!(color.len(), 7);
            assert!(color.starts_with('#'));
            assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_hue_in_unit_interval() {
        for name in ["Loader", "Physics", "x"] {
            let hue = name_hue(name);
            assert!((0.0..1.0).contains(&hue), "{name}: {hue}");
        }
    }
}
