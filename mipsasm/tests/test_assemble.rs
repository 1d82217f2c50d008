use mipsasm::prelude::*;

#[test]
fn test_assemble_fibonacci() {
    let source = include_str!("fibonacci.asm");

    match assemble("fibonacci.asm", source) {
        Ok(assembly) => {
            assert_eq!(assembly.statements.len(), 17);
            assert_eq!(assembly.globals.lookup("main"), Some(0x0040_0000));

            let listing = assembly.listing();
            assert!(listing.contains("0x00400000  lui $1, 4097"));
            assert!(listing.contains("0x00400004  addi $8, $1, 0"));
            assert!(listing.contains("0x00400008  addi $9, $0, 10"));
            assert!(listing.contains("0x00400010  sw $10, 0($8)"));
            assert!(listing.contains("0x00400034  bgtz $9, -7"));
            assert!(listing.contains("0x00400038  nop"));
            assert!(listing.contains("0x00400040  nop"));
        }
        Err(err) => {
            panic!("{}", err)
        }
    }
}

#[test]
fn test_assemble_fibonacci_with_delayed_branching() {
    let source = include_str!("fibonacci.asm");

    let mut assembler = Assembler::new(AssemblerConfig {
        delayed_branching: true,
        ..AssemblerConfig::default()
    });
    match assembler.assemble_source("fibonacci.asm", source) {
        Ok(assembly) => {
            // No padding after branches, so the program shrinks by two words.
            assert_eq!(assembly.statements.len(), 15);
            assert!(assembly.listing().contains("0x00400034  bgtz $9, -7"));
        }
        Err(err) => {
            panic!("{}", err)
        }
    }
}

#[test]
fn test_undefined_symbol_fails() {
    const CODE: &str = "\
        .text
main:   j somewhere_else
";

    match assemble("broken.asm", CODE) {
        Ok(_) => panic!("expected assembly to fail"),
        Err(err) => {
            let message = format!("{}", err);
            assert!(message.contains("assembly failed"));
            assert!(message.contains("Undefined symbol 'somewhere_else'"));
        }
    }
}
