//! Hub-side routing state.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::RouterError;
use crate::id::{CallId, NodeId};
use crate::wire::invoke::HubInvoke;

/// One forwarded call the hub has not yet seen answered.
#[derive(Debug)]
pub(crate) struct InFlight {
    /// Node the call was forwarded to; only results from it count.
    pub(crate) waiting_on: NodeId,
    /// Node whose pending call the results must reach.
    pub(crate) caller: NodeId,
    /// The forwarded invoke, kept for diagnostics.
    pub(crate) invoke: HubInvoke,
}

/// What the hub knows about the mesh: who owns each endpoint, who listens
/// on each channel, and which forwarded calls are in flight.
#[derive(Default)]
pub(crate) struct HubState {
    owners: Mutex<HashMap<String, (NodeId, u64)>>,
    listeners: Mutex<HashMap<String, HashSet<NodeId>>>,
    in_flight: Mutex<HashMap<CallId, InFlight>>,
}

impl HubState {
    /// Records `node` as the owner of endpoint `name`.
    ///
    /// The first claim wins; a claim while another node owns the name is
    /// refused and the existing owner returned. Re-claims by the current
    /// owner just refresh the recorded version.
    pub(crate) fn record_owner(
        &self,
        name: &str,
        node: NodeId,
        version: u64,
    ) -> Result<(), NodeId> {
        let mut owners = self.owners.lock();
        match owners.get(name) {
            Some((existing, _)) if *existing != node => Err(existing.clone()),
            _ => {
                owners.insert(name.to_string(), (node, version));
                Ok(())
            }
        }
    }

    /// Clears the owner of `name` if it is `node`. Idempotent.
    pub(crate) fn clear_owner(&self, name: &str, node: &NodeId) {
        let mut owners = self.owners.lock();
        if owners.get(name).is_some_and(|(owner, _)| owner == node) {
            owners.remove(name);
        }
    }

    pub(crate) fn owner(&self, name: &str) -> Option<(NodeId, u64)> {
        self.owners.lock().get(name).cloned()
    }

    pub(crate) fn add_listener(&self, name: &str, node: NodeId) {
        self.listeners
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert(node);
    }

    pub(crate) fn remove_listener(&self, name: &str, node: &NodeId) {
        let mut listeners = self.listeners.lock();
        if let Some(set) = listeners.get_mut(name) {
            set.remove(node);
            if set.is_empty() {
                listeners.remove(name);
            }
        }
    }

    pub(crate) fn listeners(&self, name: &str) -> Vec<NodeId> {
        self.listeners
            .lock()
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records a forwarded call awaiting its answer.
    pub(crate) fn begin(&self, call_id: CallId, in_flight: InFlight) {
        self.in_flight.lock().insert(call_id, in_flight);
    }

    /// Takes the record for `call_id`, but only if `from` is the node the
    /// call was forwarded to.
    ///
    /// A result from any other node is a protocol violation. The record
    /// stays put so the legitimate executor can still answer, and the
    /// caller keeps waiting instead of receiving an impostor's results.
    pub(crate) fn take_answered(
        &self,
        call_id: &CallId,
        from: &NodeId,
    ) -> Result<Option<InFlight>, RouterError> {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get(call_id) {
            None => Ok(None),
            Some(record) if record.waiting_on != *from => {
                Err(RouterError::UnexpectedResultOrigin {
                    call_id: call_id.clone(),
                    waiting_on: record.waiting_on.clone(),
                    got: from.clone(),
                })
            }
            Some(_) => Ok(in_flight.remove(call_id)),
        }
    }

    /// Forgets everything `node` was involved in: endpoint ownership,
    /// channel subscriptions, and the in-flight calls it was executing.
    /// The in-flight records are returned so their callers can be failed.
    pub(crate) fn prune(&self, node: &NodeId) -> Vec<(CallId, InFlight)> {
        self.owners.lock().retain(|_, value| value.0 != *node);
        {
            let mut listeners = self.listeners.lock();
            for set in listeners.values_mut() {
                set.remove(node);
            }
            listeners.retain(|_, set| !set.is_empty());
        }
        let mut in_flight = self.in_flight.lock();
        let ids: Vec<CallId> = in_flight
            .iter()
            .filter(|(_, record)| record.waiting_on == *node)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| {
                let record = in_flight.remove(&id)?;
                Some((id, record))
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{MethodDesc, MethodTable};
    use crate::wire::call::RemoteMethodCall;

    static METHODS: [MethodDesc; 1] = [MethodDesc {
        ordinal: 0,
        name: "ping",
        arity: 0,
        returns_value: true,
    }];
    static TABLE: MethodTable = MethodTable::new("Ping", &METHODS);

    fn invoke(seq: u64) -> HubInvoke {
        let method = TABLE.by_ordinal(0).expect("ping");
        let call = RemoteMethodCall::new("ping", method, None).expect("call");
        HubInvoke::new(
            CallId::new(NodeId::new("caller"), seq),
            true,
            TABLE.version(),
            call,
        )
    }

    fn in_flight(waiting_on: &str, seq: u64) -> InFlight {
        InFlight {
            waiting_on: NodeId::new(waiting_on),
            caller: NodeId::new("caller"),
            invoke: invoke(seq),
        }
    }

    #[test]
    fn first_owner_claim_wins() {
        let hub = HubState::default();
        hub.record_owner("game.move", NodeId::new("alpha"), 1)
            .expect("first claim");

        let existing = hub
            .record_owner("game.move", NodeId::new("beta"), 1)
            .expect_err("second claim refused");
        assert_eq!(existing, NodeId::new("alpha"));

        // The owner itself may refresh its claim.
        hub.record_owner("game.move", NodeId::new("alpha"), 2)
            .expect("refresh");
        assert_eq!(hub.owner("game.move"), Some((NodeId::new("alpha"), 2)));
    }

    #[test]
    fn clear_owner_ignores_other_nodes() {
        let hub = HubState::default();
        hub.record_owner("game.move", NodeId::new("alpha"), 1)
            .expect("claim");

        hub.clear_owner("game.move", &NodeId::new("beta"));
        assert!(hub.owner("game.move").is_some());

        hub.clear_owner("game.move", &NodeId::new("alpha"));
        assert!(hub.owner("game.move").is_none());
        // And again, idempotently.
        hub.clear_owner("game.move", &NodeId::new("alpha"));
    }

    #[test]
    fn results_from_the_wrong_node_leave_the_record_intact() {
        let hub = HubState::default();
        let id = CallId::new(NodeId::new("caller"), 1);
        hub.begin(id.clone(), in_flight("executor", 1));

        let err = hub
            .take_answered(&id, &NodeId::new("impostor"))
            .expect_err("wrong node");
        assert!(matches!(err, RouterError::UnexpectedResultOrigin { .. }));
        assert_eq!(hub.in_flight_len(), 1);

        let record = hub
            .take_answered(&id, &NodeId::new("executor"))
            .expect("right node")
            .expect("record still there");
        assert_eq!(record.caller, NodeId::new("caller"));
        assert_eq!(hub.in_flight_len(), 0);
    }

    #[test]
    fn unknown_results_are_not_an_error() {
        let hub = HubState::default();
        let id = CallId::new(NodeId::new("caller"), 7);
        let taken = hub
            .take_answered(&id, &NodeId::new("executor"))
            .expect("no protocol violation");
        assert!(taken.is_none());
    }

    #[test]
    fn prune_rips_a_node_out_of_everything() {
        let hub = HubState::default();
        hub.record_owner("game.move", NodeId::new("alpha"), 1)
            .expect("claim");
        hub.record_owner("game.battle", NodeId::new("beta"), 1)
            .expect("claim");
        hub.add_listener("game.watch", NodeId::new("alpha"));
        hub.add_listener("game.watch", NodeId::new("beta"));
        hub.begin(
            CallId::new(NodeId::new("caller"), 1),
            in_flight("alpha", 1),
        );
        hub.begin(
            CallId::new(NodeId::new("caller"), 2),
            in_flight("beta", 2),
        );

        let orphaned = hub.prune(&NodeId::new("alpha"));
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].1.waiting_on, NodeId::new("alpha"));

        assert!(hub.owner("game.move").is_none());
        assert!(hub.owner("game.battle").is_some());
        assert_eq!(hub.listeners("game.watch"), vec![NodeId::new("beta")]);
        assert_eq!(hub.in_flight_len(), 1);
    }
}
