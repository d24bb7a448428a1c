//! The fixed set of fields a rule condition can read.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    Str,
    /// Boolean.
    Bool,
}

impl Type {
    /// Whether arithmetic and ordering apply.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Bool => "bool",
        })
    }
}

/// Runtime value borrowed from an environment or a compiled constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    Str(&'a str),
    /// Boolean.
    Bool(bool),
}

macro_rules! fields {
    ($($variant:ident => $name:literal : $ty:ident,)*) => {
        /// A readable environment field.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Field {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
        }

        impl Field {
            /// Every field, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// Name used in conditions.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// Static type.
            #[must_use]
            pub const fn ty(self) -> Type {
                match self {
                    $(Self::$variant => Type::$ty,)*
                }
            }

            /// Look a field up by name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

fields! {
    BasePrice => "base_price": Int,
    SeatClass => "seat_class": Str,
    SeatCategory => "seat_category": Str,
    DayOfWeek => "day_of_week": Str,
    DaysUntilDeparture => "days_until_departure": Int,
    OccupancyRate => "occupancy_rate": Float,
    Quantity => "quantity": Int,
    IsHoliday => "is_holiday": Bool,
    Hour => "hour": Int,
    Minute => "minute": Int,
    TripId => "trip_id": Str,
    RouteId => "route_id": Str,
    ScheduleId => "schedule_id": Str,
    FromStationId => "from_station_id": Str,
    ToStationId => "to_station_id": Str,
    VehicleType => "vehicle_type": Str,
    VehicleClass => "vehicle_class": Str,
    PromoCode => "promo_code": Str,
}

/// Inputs a rule is evaluated against.
///
/// `day_of_week` holds the English day name (`"Saturday"`), and
/// `occupancy_rate` is in `0.0..=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingEnvironment {
    /// Base price in paisa; set by the engine before evaluation.
    pub base_price: i64,
    /// Seat class, e.g. `economy` or `business`.
    pub seat_class: String,
    /// Seat category within the class.
    pub seat_category: String,
    /// English name of the travel day.
    pub day_of_week: String,
    /// Whole days from today to the travel date, never negative.
    pub days_until_departure: i64,
    /// Share of seats sold.
    pub occupancy_rate: f64,
    /// Number of seats requested.
    pub quantity: i64,
    /// Whether the travel date is a holiday.
    pub is_holiday: bool,
    /// Departure hour, 0-23.
    pub hour: i64,
    /// Departure minute.
    pub minute: i64,
    /// Trip id.
    pub trip_id: String,
    /// Route id.
    pub route_id: String,
    /// Schedule id.
    pub schedule_id: String,
    /// Origin station.
    pub from_station_id: String,
    /// Destination station.
    pub to_station_id: String,
    /// Vehicle type (bus, train, launch).
    pub vehicle_type: String,
    /// Vehicle class.
    pub vehicle_class: String,
    /// Promo code entered by the customer.
    pub promo_code: String,
}

impl PricingEnvironment {
    /// Read a field.
    #[must_use]
    pub fn get(&self, field: Field) -> Value<'_> {
        match field {
            Field::BasePrice => Value::Int(self.base_price),
            Field::SeatClass => Value::Str(&self.seat_class),
            Field::SeatCategory => Value::Str(&self.seat_category),
            Field::DayOfWeek => Value::Str(&self.day_of_week),
            Field::DaysUntilDeparture => Value::Int(self.days_until_departure),
            Field::OccupancyRate => Value::Float(self.occupancy_rate),
            Field::Quantity => Value::Int(self.quantity),
            Field::IsHoliday => Value::Bool(self.is_holiday),
            Field::Hour => Value::Int(self.hour),
            Field::Minute => Value::Int(self.minute),
            Field::TripId => Value::Str(&self.trip_id),
            Field::RouteId => Value::Str(&self.route_id),
            Field::ScheduleId => Value::Str(&self.schedule_id),
            Field::FromStationId => Value::Str(&self.from_station_id),
            Field::ToStationId => Value::Str(&self.to_station_id),
            Field::VehicleType => Value::Str(&self.vehicle_type),
            Field::VehicleClass => Value::Str(&self.vehicle_class),
            Field::PromoCode => Value::Str(&self.promo_code),
        }
    }
}
