use upkg::bytecode::{
    render_tokens, HardcodedNatives, Label, NativeFunction, NativeMap, NativeTable, ScriptFormat, ScriptReader,
    ScriptWriter, Token,
};
use upkg::{Error, NameEntry, ObjectRef, PackageTables};

fn tables() -> PackageTables {
    let names = ["None", "Begin", "Touch"].into_iter().map(|n| NameEntry::new(n, 0)).collect();
    PackageTables::new("Test", names, Vec::new(), Vec::new())
}

fn decode(format: ScriptFormat, bytes: &[u8]) -> upkg::Result<Vec<Token>> {
    let t = tables();
    ScriptReader::new(&t, &HardcodedNatives, format).read_script(&mut &bytes[..], bytes.len() as u32)
}

fn render(tokens: &[Token]) -> Vec<String> {
    render_tokens(&tables(), tokens).unwrap()
}

fn native(index: u32) -> NativeFunction {
    HardcodedNatives.native(index).unwrap()
}

#[test]
fn test_single_byte_native() {
    let tokens = decode(ScriptFormat::Extended, &[0x75, 0x16]).unwrap();
    assert_eq!(render(&tokens), ["Enable()"]);
}

#[test]
fn test_extended_native_index() {
    // 0x61 0x00 -> native 256
    let tokens = decode(ScriptFormat::Extended, &[0x61, 0x00, 0x16]).unwrap();
    assert_eq!(render(&tokens), ["Sleep()"]);
    match &tokens[0] {
        Token::NativeCall { function, params } => {
            assert_eq!(function.index, 256);
            assert!(params.is_empty());
        }
        other => panic!("unexpected token {other:?}"),
    }
}

#[test]
fn test_native_below_first_index_is_rejected() {
    // 0x60 0x10 -> index 0x10, below the first native slot
    assert!(matches!(decode(ScriptFormat::Extended, &[0x60, 0x10, 0x16]), Err(Error::Format(_))));
}

#[test]
fn test_unknown_native() {
    let t = tables();
    let natives = NativeMap::default();
    let result = ScriptReader::new(&t, &natives, ScriptFormat::Extended).read_script(&mut &[0x75u8, 0x16][..], 2);
    assert!(matches!(result, Err(Error::UnknownNative(0x75))));
}

#[test]
fn test_conversion_table_only_after_prefix() {
    // IntToINT64 of IntZero
    let tokens = decode(ScriptFormat::Extended, &[0x39, 0x5B, 0x25]).unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(matches!(&tokens[0], Token::Conversion(inner)
        if matches!(&**inner, Token::Cast { name: "IntToINT64", .. })));
    assert_eq!(render(&tokens), ["int64(0)"]);

    assert!(matches!(
        decode(ScriptFormat::Extended, &[0x5B, 0x25]),
        Err(Error::UnknownOpcode { opcode: 0x5B, .. })
    ));
    // legacy scripts have no 64-bit conversions
    assert!(matches!(
        decode(ScriptFormat::Legacy, &[0x39, 0x5B, 0x25]),
        Err(Error::UnknownOpcode { opcode: 0x5B, .. })
    ));
}

#[test]
fn test_remove_and_bool_to_int_share_opcode() {
    // main table: dynamic array Remove(array, index, count)
    let remove = decode(ScriptFormat::Extended, &[0x41, 0x00, 0x01, 0x25, 0x26]).unwrap();
    assert!(matches!(&remove[0], Token::Remove { .. }));

    // conversion table: BoolToInt
    let cast = decode(ScriptFormat::Legacy, &[0x39, 0x41, 0x27]).unwrap();
    assert_eq!(render(&cast), ["int(true)"]);
}

#[test]
fn test_operator_rendering() {
    let one = || Token::IntOne;
    let zero = || Token::IntZero;
    let add = |lhs, rhs| Token::NativeCall { function: native(146), params: vec![lhs, rhs] };
    let mul = |lhs, rhs| Token::NativeCall { function: native(144), params: vec![lhs, rhs] };
    let sub = |lhs, rhs| Token::NativeCall { function: native(147), params: vec![lhs, rhs] };

    let tokens = vec![
        mul(add(one(), zero()), one()),
        add(mul(one(), zero()), one()),
        sub(one(), sub(one(), zero())),
        Token::NativeCall { function: native(129), params: vec![Token::True] },
    ];
    assert_eq!(render(&tokens), ["(1 + 0) * 1", "1 * 0 + 1", "1 - (1 - 0)", "!true"]);
}

#[test]
fn test_control_flow_rendering() {
    let tokens = vec![
        Token::LabelTable(vec![Label { name: 1, offset: 0x12 }, Label { name: 0, offset: -1 }]),
        Token::JumpIfNot { offset: 0x20, condition: Box::new(Token::False) },
        Token::Jump { offset: 0x04 },
        Token::Case { offset: 0xFFFF, value: None },
        Token::Return(Box::new(Token::Nothing)),
        Token::VirtualFunction { name: 2, params: vec![Token::NoObject, Token::Nothing] },
    ];
    assert_eq!(render(&tokens), [
        "labels Begin@0012",
        "if (!false) goto 0020",
        "goto 0004",
        "default:",
        "return",
        "Touch(none)",
    ]);
}

#[test]
fn test_encode_decode_script() {
    let tokens = vec![
        Token::LabelTable(vec![Label { name: 1, offset: 0 }, Label { name: 0, offset: -1 }]),
        Token::Let {
            target: Box::new(Token::LocalVariable(ObjectRef(-4))),
            value:  Box::new(Token::NativeCall {
                function: native(146),
                params:   vec![Token::IntConst(40_000), Token::IntConstByte(2)],
            }),
        },
        Token::JumpIfNot {
            offset:    0x30,
            condition: Box::new(Token::Conversion(Box::new(Token::Cast {
                opcode:  0x41,
                name:    "BoolToInt",
                operand: Box::new(Token::True),
            }))),
        },
        Token::NativeCall { function: native(256), params: vec![Token::FloatConst(0.5)] },
        Token::StringConst("hello".into()),
        Token::UnicodeStringConst("wide".into()),
        Token::VectorConst { x: 1.0, y: 2.0, z: 3.0 },
        Token::Return(Box::new(Token::Nothing)),
    ];

    let mut bytes = Vec::new();
    let size = ScriptWriter::new().write_script(&mut bytes, &tokens).unwrap();
    // compact indices and object refs count four bytes in memory
    assert!(size as usize >= bytes.len());

    let t = tables();
    let back = ScriptReader::new(&t, &HardcodedNatives, ScriptFormat::Extended)
        .read_script(&mut bytes.as_slice(), size)
        .unwrap();
    assert_eq!(back, tokens);
}

#[test]
fn test_truncated_script() {
    // IntConst with two of its four bytes
    assert!(decode(ScriptFormat::Extended, &[0x1D, 0x01, 0x02]).is_err());
}

#[test]
fn test_script_format_parse() {
    assert_eq!("legacy".parse::<ScriptFormat>().unwrap(), ScriptFormat::Legacy);
    assert_eq!("Extended".parse::<ScriptFormat>().unwrap(), ScriptFormat::Extended);
    assert!("modern".parse::<ScriptFormat>().is_err());
    assert_eq!(ScriptFormat::default(), ScriptFormat::Extended);
}

#[test]
fn test_nesting_limit() {
    // return return ... return; each level wraps the next expression
    let mut bytes = vec![0x04; 100_000];
    bytes.push(0x0B);
    assert!(matches!(decode(ScriptFormat::Extended, &bytes), Err(Error::Format(_))));

    // a chain of binary operators nests on its left operand
    let mut bytes = Vec::new();
    for _ in 0..1000 {
        bytes.push(0x92);
    }
    bytes.push(0x26);
    for _ in 0..1000 {
        bytes.extend_from_slice(&[0x25, 0x16]);
    }
    assert!(matches!(decode(ScriptFormat::Extended, &bytes), Err(Error::Format(_))));

    // ordinary depths still decode
    let mut bytes = vec![0x04; 20];
    bytes.push(0x0B);
    let tokens = decode(ScriptFormat::Extended, &bytes).unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(render(&tokens)[0].starts_with("return return"));
}

#[test]
fn test_omitted_arguments() {
    let call = Token::VirtualFunction {
        name:   2,
        params: vec![Token::IntOne, Token::Nothing, Token::IntZero, Token::Nothing],
    };
    assert_eq!(render(&[call]), ["Touch(1, , 0)"]);
}
