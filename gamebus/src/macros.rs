//! The `remote_interface!` macro.

/// Declares a remotely invokable interface.
///
/// One invocation produces four things:
///
/// - the trait itself, implemented by whatever game logic serves the
///   endpoint
/// - a `static` [`MethodTable`](crate::MethodTable) giving every method a
///   stable wire ordinal
/// - a stub type implementing [`RemoteStub`](crate::RemoteStub) whose
///   methods package their arguments and submit through a router
/// - a [`RemoteDispatch`](crate::RemoteDispatch) impl for `dyn Trait`, so
///   implementors register without hand-written glue
///
/// Methods are numbered explicitly. The numbering, together with the
/// method names, arities and return presence, feeds the table's version
/// fingerprint; nodes whose fingerprints differ refuse to dispatch to
/// each other rather than risk invoking the wrong method.
///
/// A method that returns nothing omits the arrow entirely. Interfaces
/// where every method does so are broadcast-eligible and can back a
/// channel.
///
/// ```
/// use gamebus::remote_interface;
///
/// remote_interface! {
///     /// Movement rules served by the game host.
///     pub trait MoveDelegate (stub MoveDelegateStub, table MOVE_DELEGATE) {
///         /// Whether the unit may move this turn.
///         0 => fn can_move(unit_id: u32) -> bool;
///         /// Carry out a move.
///         1 => fn do_move(unit_id: u32, destination: String);
///     }
/// }
///
/// assert_eq!(MOVE_DELEGATE.interface(), "MoveDelegate");
/// assert_eq!(MOVE_DELEGATE.methods().len(), 2);
/// assert!(!MOVE_DELEGATE.broadcast_eligible());
/// ```
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $trait_name:ident (stub $stub_name:ident, table $table_name:ident) {
            $(
                $(#[$method_meta:meta])*
                $ordinal:literal => fn $method:ident ( $( $arg:ident : $arg_ty:ty ),* $(,)? ) $(-> $ret:ty)? ;
            )+
        }
    ) => {
        $(#[$meta])*
        $vis trait $trait_name: ::std::marker::Send + ::std::marker::Sync {
            $(
                $(#[$method_meta])*
                fn $method(&self $(, $arg: $arg_ty)*) $(-> $ret)?;
            )+
        }

        #[doc = concat!("Method table for [`", stringify!($trait_name), "`].")]
        $vis static $table_name: $crate::MethodTable = $crate::MethodTable::new(
            stringify!($trait_name),
            &[
                $(
                    $crate::MethodDesc {
                        ordinal: $ordinal,
                        name: stringify!($method),
                        arity: (&[$(stringify!($arg)),*] as &[&str]).len() as u8,
                        returns_value: $crate::__returns_value!($($ret)?),
                    },
                )+
            ],
        );

        impl $crate::RemoteDispatch for dyn $trait_name {
            fn table(&self) -> &'static $crate::MethodTable {
                &$table_name
            }

            fn dispatch(
                &self,
                call: &$crate::ResolvedCall<'_>,
            ) -> ::std::result::Result<$crate::RemoteMethodCallResults, $crate::CallError> {
                match call.ordinal() {
                    $(
                        $ordinal => {
                            #[allow(unused_mut)]
                            let mut index = 0usize;
                            $(
                                let $arg: $arg_ty = {
                                    let value = call.decode_arg(index)?;
                                    index += 1;
                                    value
                                };
                            )*
                            let _ = index;
                            let output = self.$method($($arg),*);
                            $crate::RemoteMethodCallResults::from_value(&output)
                                .map_err($crate::CallError::from)
                        }
                    )+
                    other => ::std::result::Result::Err($crate::CallError::Contract(format!(
                        "no method with ordinal {} on interface '{}'",
                        other,
                        stringify!($trait_name)
                    ))),
                }
            }
        }

        #[doc = concat!("Generated stub for [`", stringify!($trait_name), "`].")]
        #[derive(Clone)]
        $vis struct $stub_name {
            handle: $crate::StubHandle,
        }

        impl $stub_name {
            $(
                $(#[$method_meta])*
                #[allow(unused_parens)]
                pub fn $method(
                    &self $(, $arg: $arg_ty)*
                ) -> ::std::result::Result<($($ret)?), $crate::CallError> {
                    #[allow(unused_mut)]
                    let mut args = ::std::vec::Vec::new();
                    $(
                        args.push($crate::stub::encode_arg(&$arg)?);
                    )*
                    let args = if args.is_empty() {
                        ::std::option::Option::None
                    } else {
                        ::std::option::Option::Some(args)
                    };
                    match self.handle.call($ordinal, args)? {
                        ::std::option::Option::Some(results) => results.into_result(),
                        ::std::option::Option::None => $crate::stub::null_value(),
                    }
                }
            )+
        }

        impl $crate::RemoteStub for $stub_name {
            fn table() -> &'static $crate::MethodTable {
                &$table_name
            }

            fn from_handle(handle: $crate::StubHandle) -> Self {
                Self { handle }
            }
        }

        impl ::std::cmp::PartialEq for $stub_name {
            fn eq(&self, other: &Self) -> bool {
                self.handle == other.handle
            }
        }

        impl ::std::cmp::Eq for $stub_name {}

        impl ::std::hash::Hash for $stub_name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&self.handle, state);
            }
        }

        impl ::std::fmt::Display for $stub_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.handle, f)
            }
        }

        impl ::std::fmt::Debug for $stub_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($stub_name))
                    .field("endpoint", &self.handle.name().name())
                    .finish()
            }
        }
    };
}

/// Expands to `true` when a return type is present. Implementation detail
/// of [`remote_interface!`].
#[doc(hidden)]
#[macro_export]
macro_rules! __returns_value {
    () => {
        false
    };
    ($ret:ty) => {
        true
    };
}

#[cfg(test)]
mod tests {
    use crate::stub::RemoteDispatch;
    use crate::wire::call::RemoteMethodCall;

    remote_interface! {
        /// Battle rules served by the game host.
        pub trait BattleDelegate (stub BattleDelegateStub, table BATTLE_DELEGATE) {
            /// Attack power of a unit.
            0 => fn attack_power(unit_id: u32) -> u32;
            /// Pull a unit back to the named territory.
            1 => fn retreat(unit_id: u32, destination: String);
            /// Re-roll hit dice.
            2 => fn reroll();
        }
    }

    struct DoubledPower;

    impl BattleDelegate for DoubledPower {
        fn attack_power(&self, unit_id: u32) -> u32 {
            unit_id * 2
        }

        fn retreat(&self, _unit_id: u32, _destination: String) {}

        fn reroll(&self) {}
    }

    #[test]
    fn table_reflects_the_declaration() {
        assert_eq!(BATTLE_DELEGATE.interface(), "BattleDelegate");

        let attack = BATTLE_DELEGATE.by_ordinal(0).expect("ordinal 0");
        assert_eq!(attack.name, "attack_power");
        assert_eq!(attack.arity, 1);
        assert!(attack.returns_value);

        let retreat = BATTLE_DELEGATE.by_ordinal(1).expect("ordinal 1");
        assert_eq!(retreat.arity, 2);
        assert!(!retreat.returns_value);

        let reroll = BATTLE_DELEGATE.by_ordinal(2).expect("ordinal 2");
        assert_eq!(reroll.arity, 0);
        assert!(!reroll.returns_value);

        assert!(!BATTLE_DELEGATE.broadcast_eligible());
    }

    #[test]
    fn dispatch_routes_by_ordinal() {
        let implementor: &dyn BattleDelegate = &DoubledPower;
        let method = BATTLE_DELEGATE.by_ordinal(0).expect("attack_power");
        let args = vec![crate::stub::encode_arg(&21u32).expect("encode unit id")];
        let call = RemoteMethodCall::new("battle", method, Some(args)).expect("call");

        let resolved = call.resolve(&BATTLE_DELEGATE).expect("resolve");
        let results = implementor.dispatch(&resolved).expect("dispatch");
        assert_eq!(results.into_result::<u32>().expect("decode"), 42);
    }

    #[test]
    fn void_methods_answer_with_null() {
        let implementor: &dyn BattleDelegate = &DoubledPower;
        let method = BATTLE_DELEGATE.by_ordinal(2).expect("reroll");
        let call = RemoteMethodCall::new("battle", method, None).expect("call");

        let resolved = call.resolve(&BATTLE_DELEGATE).expect("resolve");
        let results = implementor.dispatch(&resolved).expect("dispatch");
        results.into_result::<()>().expect("null decodes as unit");
    }

    #[test]
    fn renumbering_changes_the_version() {
        remote_interface! {
            /// Same methods under a different numbering.
            pub trait BattleDelegateAlt (stub BattleDelegateAltStub, table BATTLE_DELEGATE_ALT) {
                /// Attack power of a unit.
                3 => fn attack_power(unit_id: u32) -> u32;
                /// Pull a unit back to the named territory.
                4 => fn retreat(unit_id: u32, destination: String);
                /// Re-roll hit dice.
                5 => fn reroll();
            }
        }

        assert_ne!(BATTLE_DELEGATE.version(), BATTLE_DELEGATE_ALT.version());
    }

    #[test]
    fn broadcast_interfaces_are_all_void() {
        remote_interface! {
            /// Channel surface every player watches.
            pub trait GameWatcher (stub GameWatcherStub, table GAME_WATCHER) {
                /// A unit arrived somewhere.
                0 => fn unit_moved(unit_id: u32, territory: String);
            }
        }

        assert!(GAME_WATCHER.broadcast_eligible());
    }
}
