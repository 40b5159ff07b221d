//! Runtime fault statuses: the VM stops, stays inspectable, and resets.

use std::cell::RefCell;
use std::rc::Rc;

use crustyvm::{Callback, CallbackError, CallbackValue, CrustyVm, NoLog, RunError, Status, ValType, VmConfig};

fn vm(source: &str, callbacks: Vec<Callback>) -> CrustyVm<NoLog> {
    CrustyVm::new("test.cvm", source.as_bytes(), callbacks, VmConfig::default(), NoLog).unwrap()
}

#[test]
fn index_equal_to_length_is_out_of_range() {
    let source = "\
static a ints 4
static i 4
proc init
  move a:i 1
  ret
";
    let mut vm = vm(source, vec![]);
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::OutOfRange));
    assert_eq!(vm.status(), Status::OutOfRange);
    assert_eq!(vm.status().to_string(), "Array access out of range");
    vm.reset();
    assert_eq!(vm.status(), Status::Ready);
}

#[test]
fn float_used_as_index() {
    let source = "\
static a ints 4
static f floats 1
proc init
  move a:f 1
  ret
";
    let mut vm = vm(source, vec![]);
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::FloatIndex));
    assert_eq!(vm.status().to_string(), "Float used as index");
}

#[test]
fn deep_recursion_overflows_the_call_stack() {
    let source = "\
proc spin
  call spin
  ret
proc init
  call spin
  ret
";
    let mut vm = CrustyVm::new(
        "test.cvm",
        source.as_bytes(),
        vec![],
        VmConfig {
            callstack_size: 32,
            ..VmConfig::default()
        },
        NoLog,
    )
    .unwrap();
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::StackOverflow));
}

#[test]
fn frames_overflow_the_data_stack() {
    // Each frame needs 16 bytes of locals but the program only reserves
    // space for the procedures scanned, so unbounded recursion runs out.
    let source = "\
proc spin
  local pad ints 4
  call spin
  ret
proc init
  call spin
  ret
";
    let mut vm = vm(source, vec![]);
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::StackOverflow));
}

#[test]
fn bitwise_on_floats_is_invalid() {
    let source = "\
static f floats 1
proc init
  and f 1
  ret
";
    let mut vm = vm(source, vec![]);
    assert_eq!(
        vm.run("init").unwrap_err(),
        RunError::Stopped(Status::InvalidInstruction)
    );
}

#[test]
fn shift_into_float_destination_is_invalid() {
    let source = "\
static f floats 1
proc init
  shl f 2
  ret
";
    let mut vm = vm(source, vec![]);
    assert_eq!(
        vm.run("init").unwrap_err(),
        RunError::Stopped(Status::InvalidInstruction)
    );
}

#[test]
fn division_by_zero_does_not_crash() {
    let source = "\
static a 10
static z 0
proc init
  div a z
  mod a z
  ret
";
    let mut vm = vm(source, vec![]);
    vm.run("init").unwrap();
    assert_eq!(vm.status(), Status::Ready);
}

#[test]
fn failing_write_callback_stops_execution() {
    let source = "\
proc init
  move sink 1
  ret
";
    let sink = Callback::writer("sink", 1, Box::new(|_data, _index| Err(CallbackError)));
    let mut vm = vm(source, vec![sink]);
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::CallbackFailed));
    assert_eq!(vm.status().to_string(), "Callback returned failure");
    vm.reset();
    assert_eq!(vm.status(), Status::Ready);
}

#[test]
fn failing_read_callback_stops_execution() {
    let source = "\
static x 0
proc init
  move x sensor
  ret
";
    let calls: Rc<RefCell<u32>> = Rc::default();
    let counter = Rc::clone(&calls);
    let sensor = Callback::reader(
        "sensor",
        1,
        ValType::Int,
        Box::new(move |_index| {
            *counter.borrow_mut() += 1;
            Err(CallbackError)
        }),
    );
    let mut vm = vm(source, vec![sensor]);
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::CallbackFailed));
    assert_eq!(*calls.borrow(), 1);
    // The aborted instruction did not advance; a fresh begin retries it.
    vm.reset();
    assert_eq!(vm.run("init").unwrap_err(), RunError::Stopped(Status::CallbackFailed));
    assert_eq!(*calls.borrow(), 2);
}

#[test]
fn read_callback_value_reaches_the_program() {
    let source = "\
static x 0
proc init
  move x sensor
  move out x
  ret
";
    let sensor = Callback::reader("sensor", 1, ValType::Int, Box::new(|_| Ok(CallbackValue::Int(123))));
    let seen: Rc<RefCell<Vec<i32>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let out = Callback::writer(
        "out",
        1,
        Box::new(move |data, _| {
            if let crustyvm::WriteArg::Ints(values) = data {
                sink.borrow_mut().extend_from_slice(values);
            }
            Ok(())
        }),
    );
    let mut vm = vm(source, vec![sensor, out]);
    vm.run("init").unwrap();
    assert_eq!(seen.borrow()[..], [123]);
}
