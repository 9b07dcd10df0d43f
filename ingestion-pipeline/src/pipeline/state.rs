use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Prepared, Embedded, Uploaded, Failed],
    events {
        prepare { transition: { from: Ready, to: Prepared } }
        embed { transition: { from: Prepared, to: Embedded } }
        upload { transition: { from: Embedded, to: Uploaded } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Prepared, to: Failed }
            transition: { from: Embedded, to: Failed }
            transition: { from: Uploaded, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
