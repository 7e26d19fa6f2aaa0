// models/src/labels.rs

/// Gives a fieldless enum a stable lowercase label: `as_str`, `ALL`,
/// `Display` and a case-insensitive `FromStr` that reports unknown values as
/// `ValidationError::UnknownValue`.
macro_rules! labelled_enum {
    ($name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::errors::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_lowercase();
                match normalized.as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err($crate::errors::ValidationError::UnknownValue {
                        kind: $kind.to_string(),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}
