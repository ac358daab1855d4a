use glam::DVec2;

/// Gravitational constant in km³ kg⁻¹ s⁻².
pub const G: f64 = 6.674e-20;
/// Acceleration cap in km/s².
pub const MAX_ACCEL: f64 = 1.0e3;
/// Pairs closer than this multiple of the larger radius exert no force.
pub const CONTACT_FACTOR: f64 = 1.15;
pub const SOFTENING_FACTOR: f64 = 0.8;

const AU_KM: f64 = 1.496e8;
const EQUILIBRIUM_AT_1AU_K: f64 = 278.0;
const BACKGROUND_K: f64 = 2.7;

#[derive(Debug, Clone, Copy)]
pub struct Particle {
    pub position: DVec2,
    pub mass_kg: f64,
    pub radius_km: f64,
}

/// Pairwise softened gravity. Returns one acceleration per particle, clamped
/// to [`MAX_ACCEL`].
pub fn gravity_accelerations(particles: &[Particle]) -> Vec<DVec2> {
    let n = particles.len();
    let mut forces = vec![DVec2::ZERO; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let a = &particles[i];
            let b = &particles[j];
            let diff = b.position - a.position;
            let dist = diff.length();
            let max_r = a.radius_km.max(b.radius_km);
            if dist < max_r * CONTACT_FACTOR || dist == 0.0 {
                continue;
            }

            // Surface separation plus softening keeps the pull finite at contact.
            let sep = (dist - (a.radius_km + b.radius_km)).max(0.0) + SOFTENING_FACTOR * max_r;
            if sep <= 0.0 {
                continue;
            }
            let magnitude = G * a.mass_kg * b.mass_kg / (sep * sep);
            let force = diff / dist * magnitude;
            forces[i] += force;
            forces[j] -= force;
        }
    }

    forces
        .into_iter()
        .zip(particles)
        .map(|(f, p)| {
            if p.mass_kg <= 0.0 {
                return DVec2::ZERO;
            }
            let acc = f / p.mass_kg;
            let mag = acc.length();
            if mag > MAX_ACCEL {
                acc * (MAX_ACCEL / mag)
            } else {
                acc
            }
        })
        .collect()
}

/// Semi-implicit Euler: velocity first, then position with the new velocity.
pub fn integrate(position: &mut DVec2, velocity: &mut DVec2, acceleration: DVec2, dt: f64) {
    *velocity += acceleration * dt;
    *position += *velocity * dt;
}

/// Velocity of a circular orbit of radius `r_km` around a primary of
/// `primary_mass_kg`, perpendicular to the radius (counter-clockwise).
pub fn circular_orbit_velocity(offset: DVec2, primary_mass_kg: f64) -> DVec2 {
    let r = offset.length();
    if r == 0.0 {
        return DVec2::ZERO;
    }
    let speed = (G * primary_mass_kg / r).sqrt();
    offset.perp() / r * speed
}

/// Blackbody equilibrium temperature at `dist_km` from the system star.
pub fn ambient_temperature_k(dist_km: f64) -> f64 {
    let au = (dist_km / AU_KM).max(1.0e-3);
    (EQUILIBRIUM_AT_1AU_K / au.sqrt()).max(BACKGROUND_K)
}

/// Linear blend from surface temperature at the ground to `space_k` at the
/// top of the atmosphere.
pub fn atmosphere_temperature_k(altitude_km: f64, atmosphere_km: f64, surface_k: f64, space_k: f64) -> f64 {
    if atmosphere_km <= 0.0 || altitude_km > atmosphere_km {
        return space_k;
    }
    let t = (altitude_km / atmosphere_km).clamp(0.0, 1.0);
    surface_k * (1.0 - t) + space_k * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_attracts_symmetrically() {
        let ps = [
            Particle { position: DVec2::ZERO, mass_kg: 5.972e24, radius_km: 6371.0 },
            Particle { position: DVec2::new(384_400.0, 0.0), mass_kg: 7.342e22, radius_km: 1737.0 },
        ];
        let acc = gravity_accelerations(&ps);
        assert!(acc[0].x > 0.0);
        assert!(acc[1].x < 0.0);
        let momentum = acc[0] * ps[0].mass_kg + acc[1] * ps[1].mass_kg;
        assert!(momentum.length() / (acc[0].x * ps[0].mass_kg) < 1e-9);
    }

    #[test]
    fn no_force_inside_contact_radius() {
        let ps = [
            Particle { position: DVec2::ZERO, mass_kg: 1.0e24, radius_km: 1000.0 },
            Particle { position: DVec2::new(1100.0, 0.0), mass_kg: 1000.0, radius_km: 0.01 },
        ];
        let acc = gravity_accelerations(&ps);
        assert_eq!(acc[1], DVec2::ZERO);
    }

    #[test]
    fn acceleration_is_clamped() {
        let ps = [
            Particle { position: DVec2::ZERO, mass_kg: 1.0e40, radius_km: 1.0 },
            Particle { position: DVec2::new(2.0, 0.0), mass_kg: 1.0, radius_km: 0.0 },
        ];
        let acc = gravity_accelerations(&ps);
        assert!((acc[1].length() - MAX_ACCEL).abs() < 1e-6);
    }

    #[test]
    fn integrate_uses_updated_velocity() {
        let mut p = DVec2::ZERO;
        let mut v = DVec2::new(1.0, 0.0);
        integrate(&mut p, &mut v, DVec2::new(1.0, 0.0), 2.0);
        assert_eq!(v, DVec2::new(3.0, 0.0));
        assert_eq!(p, DVec2::new(6.0, 0.0));
    }

    #[test]
    fn circular_velocity_is_perpendicular() {
        let v = circular_orbit_velocity(DVec2::new(384_400.0, 0.0), 5.972e24);
        assert!(v.x.abs() < 1e-12);
        assert!((v.y - 1.0184).abs() < 0.01);
    }

    #[test]
    fn ambient_falls_off_with_distance() {
        assert!((ambient_temperature_k(1.496e8) - 278.0).abs() < 1e-6);
        assert!(ambient_temperature_k(4.5e9) < 60.0);
        assert_eq!(ambient_temperature_k(1.0e20), 2.7);
    }
}
