/// Generates a non-exhaustive enum backed by a wire-name lookup table.
///
/// Each variant names its canonical wire string, optionally followed by
/// `|`-separated alias spellings that parse to the same variant (the
/// Q.850 numeric codes on hangup causes, for example). Generated surface:
///
/// - `ALL`: every variant in declaration order
/// - `as_str()`: the canonical wire name
/// - `Display` / `AsRef<str>` over the canonical name
/// - a case-insensitive `FromStr` that walks the table, so aliases and
///   canonical names resolve through the same path
///
/// The error type is defined separately, matching crate patterns like
/// `ParseHangupCauseError`.
///
/// # Example
///
/// ```ignore
/// wire_name_enum! {
///     error_type: ParseMyEnumError,
///     /// Doc comment for the enum.
///     pub enum MyEnum {
///         Foo => "foo-wire" | "foo-alias",
///         Bar => "bar-wire",
///     }
/// }
/// ```
macro_rules! wire_name_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[$($Name::$variant,)+];

            /// Accepted spellings: canonical wire name, then any aliases.
            const TABLE: &'static [(&'static str, $Name)] = &[
                $(
                    ($wire, $Name::$variant),
                    $(($alias, $Name::$variant),)*
                )+
            ];

            /// Canonical wire-format name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($Name::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $Name::TABLE
                    .iter()
                    .find(|(spelling, _)| spelling.eq_ignore_ascii_case(s))
                    .map(|(_, variant)| *variant)
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }
    };
}
