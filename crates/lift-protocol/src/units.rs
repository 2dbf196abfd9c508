//! Physical units ↔ drive units.
//!
//! Position is counted in encoder increments; the increments-per-millimetre factor depends on
//! the lift model, and the CAN and RS-232 models differ. Speed goes through rpm and the drive's
//! internal speed unit `rpm * 512 * 65536 / 1875`.

/// Drive speed units per rpm.
pub const DEVICE_SPEED_PER_RPM: f64 = 512.0 * 65536.0 / 1875.0;

/// Calibrated rpm per drive speed unit, as used when reading speed back.
///
/// Slightly larger than `1875 / (512 * 65536)`; see [`EXACT_RPM_PER_DEVICE_SPEED`].
pub const RPM_PER_DEVICE_SPEED: f64 = 0.000_055_88;

/// Algebraic inverse of [`DEVICE_SPEED_PER_RPM`].
pub const EXACT_RPM_PER_DEVICE_SPEED: f64 = 1875.0 / (512.0 * 65536.0);

/// Fixed scale factors of one lift model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub model: &'static str,
    pub increments_per_mm: f64,
    /// Kept as its own literal so metre conversions involve a single rounding step.
    pub increments_per_metre: f64,
    /// Motor rpm for 1 mm/s of column travel.
    pub rpm_per_mm_s: f64,
    /// Motor rpm for 1 m/s of column travel.
    pub rpm_per_m_s: f64,
    /// Full stroke.
    pub travel_mm: f64,
}

/// CAN lift: 0..465 mm over 0..4 571 136 increments.
pub const CAN_LIFT: Calibration = Calibration {
    model: "can-lift",
    increments_per_mm: 9830.4,
    increments_per_metre: 9_830_400.0,
    rpm_per_mm_s: 9.0009,
    rpm_per_m_s: 9000.9,
    travel_mm: 465.0,
};

/// RS-232 lift: 3 584 000 increments over 500 mm. Speed factors assume the drive's
/// 65 536 increments per motor revolution.
pub const UART_LIFT: Calibration = Calibration {
    model: "uart-lift",
    increments_per_mm: 3_584_000.0 / 500.0,
    increments_per_metre: 3_584_000.0 / 500.0 * 1000.0,
    rpm_per_mm_s: 6.5625,
    rpm_per_m_s: 6562.5,
    travel_mm: 500.0,
};

fn to_i32(x: f64) -> i32 {
    // `as` saturates at the i32 bounds and maps NaN to 0
    x.round() as i32
}

impl Calibration {
    pub fn mm_to_increments(&self, mm: f64) -> i32 {
        to_i32(mm * self.increments_per_mm)
    }

    pub fn increments_to_mm(&self, increments: i32) -> f64 {
        f64::from(increments) / self.increments_per_mm
    }

    pub fn metres_to_increments(&self, metres: f64) -> i32 {
        to_i32(metres * self.increments_per_metre)
    }

    pub fn increments_to_metres(&self, increments: i32) -> f64 {
        f64::from(increments) / self.increments_per_metre
    }

    pub fn mm_s_to_rpm(&self, mm_s: f64) -> f64 {
        mm_s * self.rpm_per_mm_s
    }

    pub fn rpm_to_mm_s(&self, rpm: f64) -> f64 {
        rpm / self.rpm_per_mm_s
    }

    pub fn m_s_to_rpm(&self, m_s: f64) -> f64 {
        m_s * self.rpm_per_m_s
    }

    pub fn rpm_to_m_s(&self, rpm: f64) -> f64 {
        rpm / self.rpm_per_m_s
    }

    pub fn travel_metres(&self) -> f64 {
        self.travel_mm / 1000.0
    }
}

/// rpm → drive speed units, rounded to the nearest unit.
pub fn rpm_to_device_speed(rpm: f64) -> i32 {
    to_i32(rpm * DEVICE_SPEED_PER_RPM)
}

/// Drive speed units → rpm, using the calibrated literal.
pub fn device_speed_to_rpm(raw: i32) -> f64 {
    f64::from(raw) * RPM_PER_DEVICE_SPEED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_position_round_trip_over_full_stroke() {
        for tenth_mm in 0..=4650 {
            let mm = f64::from(tenth_mm) / 10.0;
            let inc = CAN_LIFT.mm_to_increments(mm);
            assert_eq!(inc, (mm * 9830.4).round() as i32);
            let back = CAN_LIFT.mm_to_increments(CAN_LIFT.increments_to_mm(inc));
            assert!((back - inc).abs() <= 1, "mm {mm}");
        }
    }

    #[test]
    fn can_full_stroke_in_metres() {
        assert_eq!(CAN_LIFT.metres_to_increments(0.465), 4_571_136);
        assert_eq!(CAN_LIFT.increments_to_metres(4_571_136), 0.465);
        assert_eq!(CAN_LIFT.mm_to_increments(465.0), 4_571_136);
    }

    #[test]
    fn uart_position_scale() {
        assert_eq!(UART_LIFT.increments_per_mm, 7168.0);
        assert_eq!(UART_LIFT.metres_to_increments(0.5), 3_584_000);
        assert_eq!(UART_LIFT.increments_to_metres(3_584_000), 0.5);
        assert_eq!(UART_LIFT.mm_to_increments(24.888_392_857), 178_400);
    }

    #[test]
    fn calibrations_stay_distinct() {
        assert_ne!(
            CAN_LIFT.metres_to_increments(0.1),
            UART_LIFT.metres_to_increments(0.1)
        );
    }

    #[test]
    fn speed_conversions() {
        assert_eq!(rpm_to_device_speed(200.0), 3_579_139);
        assert_eq!(rpm_to_device_speed(-100.0), -1_789_570);
        let rpm = device_speed_to_rpm(3_579_139);
        assert!((rpm - 200.0).abs() < 0.01, "{rpm}");
        assert!((RPM_PER_DEVICE_SPEED - EXACT_RPM_PER_DEVICE_SPEED).abs() < 1e-9);

        assert!((CAN_LIFT.m_s_to_rpm(0.0465) - 418.541_85).abs() < 1e-6);
        assert!((CAN_LIFT.rpm_to_m_s(9000.9) - 1.0).abs() < 1e-12);
        assert!((CAN_LIFT.mm_s_to_rpm(10.0) - 90.009).abs() < 1e-9);
    }
}
