//! End-to-end scenarios through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crustyvm::{Callback, CrustyVm, NoLog, Status, VmConfig, WriteArg};

/// A write callback capturing everything the program sends it.
#[derive(Debug, Clone, PartialEq)]
enum Captured {
    Chars(Vec<u8>),
    Ints(Vec<i32>),
    Floats(Vec<f64>),
}

fn capture(name: &str) -> (Rc<RefCell<Vec<Captured>>>, Callback) {
    let store: Rc<RefCell<Vec<Captured>>> = Rc::default();
    let sink = Rc::clone(&store);
    let cb = Callback::writer(
        name,
        1,
        Box::new(move |data: WriteArg<'_>, _index| {
            sink.borrow_mut().push(match data {
                WriteArg::Chars(s) => Captured::Chars(s.to_vec()),
                WriteArg::Ints(s) => Captured::Ints(s.to_vec()),
                WriteArg::Floats(s) => Captured::Floats(s.to_vec()),
            });
            Ok(())
        }),
    );
    (store, cb)
}

fn vm(source: &str, callbacks: Vec<Callback>) -> CrustyVm<NoLog> {
    CrustyVm::new("test.cvm", source.as_bytes(), callbacks, VmConfig::default(), NoLog).unwrap()
}

#[test]
fn hello() {
    let source = "\
static msg string \"hi\\n\"
proc init
  move string_out msg
  ret
";
    let (store, cb) = capture("string_out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(vm.status(), Status::Ready);
    assert_eq!(store.borrow()[..], [Captured::Chars(b"hi\n".to_vec())]);
}

#[test]
fn sum_to_ten() {
    let source = "\
static i 0
static sum 0
proc init
  label top
  add sum i
  add i 1
  cmp i 11
  jumpl top
  move out sum
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(vm.status(), Status::Ready);
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![55])]);
}

#[test]
fn macro_expansion_and_expr() {
    let source = "\
macro inc v
  add v 1
endmacro inc
expr N 2+3
static x 0
proc init
  inc x
  inc x
  move out x
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![2])]);
}

#[test]
fn array_out_of_range_at_compile_time() {
    // A literal index against a known length is caught before runtime.
    let source = "\
static a ints 4
proc init
  move a:4 1
  ret
";
    let err = CrustyVm::new("test.cvm", source.as_bytes(), vec![], VmConfig::default(), NoLog).unwrap_err();
    assert!(err.message().contains("out of array size"), "{err}");
}

#[test]
fn array_out_of_range_at_runtime() {
    let source = "\
static a ints 4
static i 4
proc init
  move a:i 1
  ret
";
    let mut vm = vm(source, vec![]);
    let err = vm.run("init").unwrap_err();
    assert_eq!(err, crustyvm::RunError::Stopped(Status::OutOfRange));
    assert_eq!(vm.status(), Status::OutOfRange);
}

#[test]
fn reference_argument_writes_through() {
    let source = "\
proc inc n
  add n 1
  ret
static x 41
proc init
  call inc x
  move out x
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![42])]);
}

#[test]
fn float_int_coercion() {
    let source = "\
static f floats 1
proc init
  move f 3
  div f 2
  move out f
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Floats(vec![1.5])]);
}

#[test]
fn argument_subslice_length_and_indexing() {
    let source = "\
static arr ints \"10 20 30 40\"
proc tail a
  move out a:
  move out a:0
  ret
proc init
  call tail arr:1
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    // The argument is bound one element in: length 3, first element 20.
    assert_eq!(
        store.borrow()[..],
        [Captured::Ints(vec![3]), Captured::Ints(vec![20, 30, 40])]
    );
}

#[test]
fn array_slice_to_callback_starts_at_index() {
    let source = "\
static msg string \"abcdef\"
proc init
  move string_out msg:2
  ret
";
    let (store, cb) = capture("string_out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Chars(b"cdef".to_vec())]);
}

#[test]
fn indirect_index_through_variable() {
    let source = "\
static arr ints \"5 6 7\"
static i 2
proc init
  move out arr:i
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![7])]);
}

#[test]
fn mutual_recursion_counts_down() {
    let source = "\
static n 6
proc even
  sub n 1
  cmp n
  jumpg go_odd
  ret
  label go_odd
  call odd
  ret
proc odd
  sub n 1
  cmp n
  jumpg go_even
  ret
  label go_even
  call even
  ret
proc init
  call even
  move out n
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![0])]);
}

#[test]
fn jump_to_self_terminates_cleanly() {
    let source = "\
proc init
  label spin
  jump spin
  ret
";
    let mut vm = vm(source, vec![]);
    vm.run("init").unwrap();
    assert_eq!(vm.status(), Status::Ready);
}

#[test]
fn read_callback_feeds_arithmetic() {
    let source = "\
static total 0
proc init
  add total sensor:1
  add total sensor:2
  move out total
  ret
";
    let sensor = Callback::reader(
        "sensor",
        4,
        crustyvm::ValType::Int,
        Box::new(|index| Ok(crustyvm::CallbackValue::Int(index as i32 * 10))),
    );
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![sensor, cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![30])]);
}

#[test]
fn reset_restores_globals() {
    let source = "\
static i 0
static sum 0
proc init
  label top
  add sum i
  add i 1
  cmp i 11
  jumpl top
  move out sum
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    vm.reset();
    vm.run("init").unwrap();
    assert_eq!(
        store.borrow()[..],
        [Captured::Ints(vec![55]), Captured::Ints(vec![55])]
    );
}

#[test]
fn step_runs_one_instruction_at_a_time() {
    let source = "\
static x 0
proc init
  add x 1
  add x 1
  ret
";
    let mut vm = vm(source, vec![]);
    assert_eq!(vm.status(), Status::Ready);
    // step is a no-op before begin.
    assert_eq!(vm.step(), Status::Ready);
    vm.begin("init").unwrap();
    assert_eq!(vm.status(), Status::Active);
    assert_eq!(vm.step(), Status::Active);
    assert_eq!(vm.step(), Status::Active);
    assert_eq!(vm.step(), Status::Ready);
    assert_eq!(vm.step(), Status::Ready);
}

#[test]
fn begin_requires_zero_argument_entrypoint() {
    let source = "\
proc helper a
  add a 1
  ret
proc init
  ret
";
    let mut vm = vm(source, vec![]);
    assert!(vm.has_entrypoint("init"));
    assert!(!vm.has_entrypoint("helper"));
    assert!(!vm.has_entrypoint("missing"));
    assert_eq!(
        vm.begin("helper").unwrap_err(),
        crustyvm::RunError::EntryPointArguments("helper".to_owned())
    );
    assert_eq!(
        vm.begin("missing").unwrap_err(),
        crustyvm::RunError::UnknownProcedure("missing".to_owned())
    );
    vm.begin("init").unwrap();
    assert_eq!(vm.begin("init").unwrap_err(), crustyvm::RunError::NotReady);
}

#[test]
fn cmp_single_operand_compares_against_zero() {
    let source = "\
static x 3
proc init
  label top
  sub x 1
  cmp x
  jumpg top
  move out x
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![0])]);
}

#[test]
fn local_variables_are_per_call_and_initialized() {
    let source = "\
static total 0
proc bump
  local scratch 5
  add scratch 1
  add total scratch
  ret
proc init
  call bump
  call bump
  move out total
  ret
";
    let (store, cb) = capture("out");
    let mut vm = vm(source, vec![cb]);
    vm.run("init").unwrap();
    // scratch restarts at 5 on every call.
    assert_eq!(store.borrow()[..], [Captured::Ints(vec![12])]);
}
