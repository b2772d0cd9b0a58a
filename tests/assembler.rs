use std::io::empty;

use v6502::assembler::{assemble, Program};
use v6502::config::{Config, ROM_BASE};
use v6502::error::AsmErrorKind;
use v6502::io::Capture;
use v6502::loader::{run_source, Input, Loader, RunOutcome};

const SNAKE: &str = r"

    ; Change direction: W A S D

    define appleL         $00 ; screen location of apple, low byte
    define appleH         $01 ; screen location of apple, high byte
    define snakeHeadL     $10 ; screen location of snake head, low byte
    define snakeHeadH     $11 ; screen location of snake head, high byte
    define snakeBodyStart $12 ; start of snake body byte pairs
    define snakeDirection $02 ; direction (possible values are below)
    define snakeLength    $03 ; snake length, in bytes

    ; Directions (each using a separate bit)
    define movingUp      1
    define movingRight   2
    define movingDown    4
    define movingLeft    8

    ; ASCII values of keys controlling the snake
    define ASCII_w      $77
    define ASCII_a      $61
    define ASCII_s      $73
    define ASCII_d      $64

    ; System variables
    define sysRandom    $fe
    define sysLastKey   $ff


      jsr init
      jsr loop

    init:
      jsr initSnake
      jsr generateApplePosition
      rts


    initSnake:
      lda #movingRight  ;start direction
      sta snakeDirection

      lda #4  ;start length (2 segments)
      sta snakeLength
      
      lda #$11
      sta snakeHeadL
      
      lda #$10
      sta snakeBodyStart
      
      lda #$0f
      sta $14 ; body segment 1
      
      lda #$04
      sta snakeHeadH
      sta $13 ; body segment 1
      sta $15 ; body segment 2
      rts


    generateApplePosition:
      ;load a new random byte into $00
      lda sysRandom
      sta appleL

      ;load a new random number from 2 to 5 into $01
      lda sysRandom
      and #$03 ;mask out lowest 2 bits
      clc
      adc #2
      sta appleH

      rts


    loop:
      jsr readKeys
      jsr checkCollision
      jsr updateSnake
      jsr drawApple
      jsr drawSnake
      jsr spinWheels
      jmp loop


    readKeys:
      lda sysLastKey
      cmp #ASCII_w
      beq upKey
      cmp #ASCII_d
      beq rightKey
      cmp #ASCII_s
      beq downKey
      cmp #ASCII_a
      beq leftKey
      rts
    upKey:
      lda #movingDown
      bit snakeDirection
      bne illegalMove

      lda #movingUp
      sta snakeDirection
      rts
    rightKey:
      lda #movingLeft
      bit snakeDirection
      bne illegalMove

      lda #movingRight
      sta snakeDirection
      rts
    downKey:
      lda #movingUp
      bit snakeDirection
      bne illegalMove

      lda #movingDown
      sta snakeDirection
      rts
    leftKey:
      lda #movingRight
      bit snakeDirection
      bne illegalMove

      lda #movingLeft
      sta snakeDirection
      rts
    illegalMove:
      rts


    checkCollision:
      jsr checkAppleCollision
      jsr checkSnakeCollision
      rts


    checkAppleCollision:
      lda appleL
      cmp snakeHeadL
      bne doneCheckingAppleCollision
      lda appleH
      cmp snakeHeadH
      bne doneCheckingAppleCollision

      ;eat apple
      inc snakeLength
      inc snakeLength ;increase length
      jsr generateApplePosition
    doneCheckingAppleCollision:
      rts


    checkSnakeCollision:
      ldx #2 ;start with second segment
    snakeCollisionLoop:
      lda snakeHeadL,x
      cmp snakeHeadL
      bne continueCollisionLoop

    maybeCollided:
      lda snakeHeadH,x
      cmp snakeHeadH
      beq didCollide

    continueCollisionLoop:
      inx
      inx
      cpx snakeLength          ;got to last section with no collision
      beq didntCollide
      jmp snakeCollisionLoop

    didCollide:
      jmp gameOver
    didntCollide:
      rts


    updateSnake:
      ldx snakeLength
      dex
      txa
    updateloop:
      lda snakeHeadL,x
      sta snakeBodyStart,x
      dex
      bpl updateloop

      lda snakeDirection
      lsr
      bcs up
      lsr
      bcs right
      lsr
      bcs down
      lsr
      bcs left
    up:
      lda snakeHeadL
      sec
      sbc #$20
      sta snakeHeadL
      bcc upup
      rts
    upup:
      dec snakeHeadH
      lda #$1
      cmp snakeHeadH
      beq collision
      rts
    right:
      inc snakeHeadL
      lda #$1f
      bit snakeHeadL
      beq collision
      rts
    down:
      lda snakeHeadL
      clc
      adc #$20
      sta snakeHeadL
      bcs downdown
      rts
    downdown:
      inc snakeHeadH
      lda #$6
      cmp snakeHeadH
      beq collision
      rts
    left:
      dec snakeHeadL
      lda snakeHeadL
      and #$1f
      cmp #$1f
      beq collision
      rts
    collision:
      jmp gameOver


    drawApple:
      ldy #0
      lda sysRandom
      sta (appleL),y
      rts


    drawSnake:
      ldx snakeLength
      lda #0
      sta (snakeHeadL,x) ; erase end of tail

      ldx #0
      lda #1
      sta (snakeHeadL,x) ; paint head
      rts


    spinWheels:
      ldx #0
    spinloop:
      nop
      nop
      dex
      bne spinloop
      rts


    gameOver:
";

const SNAKE_BYTES: &str = "
    20 06 06 20 38 06 20 0d 06 20 2a 06 60 a9 02 85
    02 a9 04 85 03 a9 11 85 10 a9 10 85 12 a9 0f 85
    14 a9 04 85 11 85 13 85 15 60 a5 fe 85 00 a5 fe
    29 03 18 69 02 85 01 60 20 4d 06 20 8d 06 20 c3
    06 20 19 07 20 20 07 20 2d 07 4c 38 06 a5 ff c9
    77 f0 0d c9 64 f0 14 c9 73 f0 1b c9 61 f0 22 60
    a9 04 24 02 d0 26 a9 01 85 02 60 a9 08 24 02 d0
    1b a9 02 85 02 60 a9 01 24 02 d0 10 a9 04 85 02
    60 a9 02 24 02 d0 05 a9 08 85 02 60 60 20 94 06
    20 a8 06 60 a5 00 c5 10 d0 0d a5 01 c5 11 d0 07
    e6 03 e6 03 20 2a 06 60 a2 02 b5 10 c5 10 d0 06
    b5 11 c5 11 f0 09 e8 e8 e4 03 f0 06 4c aa 06 4c
    35 07 60 a6 03 ca 8a b5 10 95 12 ca 10 f9 a5 02
    4a b0 09 4a b0 19 4a b0 1f 4a b0 2f a5 10 38 e9
    20 85 10 90 01 60 c6 11 a9 01 c5 11 f0 28 60 e6
    10 a9 1f 24 10 f0 1f 60 a5 10 18 69 20 85 10 b0
    01 60 e6 11 a9 06 c5 11 f0 0c 60 c6 10 a5 10 29
    1f c9 1f f0 01 60 4c 35 07 a0 00 a5 fe 91 00 60
    a6 03 a9 00 81 10 a2 00 a9 01 81 10 60 a2 00 ea
    ea ca d0 fb 60
";

fn parse_hex_bytes(text: &str) -> Vec<u8> {
    text.split_whitespace()
        .map(|b| u8::from_str_radix(b, 16).unwrap())
        .collect()
}

fn assemble_ok(code: &str, origin: u16) -> Program {
    match assemble(code, origin) {
        Ok(program) => program,
        Err(e) => panic!("{}", e),
    }
}

#[test]
fn snake_program_matches_reference_listing() {
    let program = assemble_ok(SNAKE, 0x0600);
    let expected = parse_hex_bytes(SNAKE_BYTES);
    assert_eq!(program.bytes(), expected);
    assert_eq!(program.entry(), 0x0600);
    assert_eq!(program.symbols.get("init"), Some(0x0606));
    assert_eq!(program.symbols.get("gameOver"), Some(0x0735));
    assert_eq!(program.symbols.get("sysRandom"), Some(0x00fe));
}

#[test]
fn hello_world_from_string_table() {
    let out = Capture::new();
    let source = r#"
        ; print a NUL-terminated string through the console port
        CONSOLE_OUT = $D020

            LDX #0
        next:
            LDA message,X
            BEQ done
            STA CONSOLE_OUT
            INX
            BNE next
        done:
            BRK

        message:
            .stringz "Hello, 6502!\n"
    "#;
    let outcome = run_source(source, empty(), out.clone()).unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(out.text(), "Hello, 6502!\n");
}

#[test]
fn subroutines_and_stack() {
    let out = Capture::new();
    let source = "
            LDA #'0'
        loop:
            JSR putc
            CLC
            ADC #1
            CMP #'9'+1
            BNE loop
            BRK

        putc:
            PHA
            STA $D020
            PLA
            RTS
    ";
    let outcome = run_source(source, empty(), out.clone()).unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(out.text(), "0123456789");
}

#[test]
fn echo_reads_console_input() {
    let out = Capture::new();
    let source = "
        loop: LDA $D010
              BEQ done
              CMP #'a'
              BCC emit
              SEC
              SBC #$20     ; to upper case
        emit: STA $D020
              JMP loop
        done: BRK
    ";
    let outcome = run_source(source, &b"shout"[..], out.clone()).unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(out.text(), "SHOUT");
}

#[test]
fn mnemonics_are_case_insensitive_labels_are_not() {
    let upper = assemble_ok("  LDA $10,X\n  ASL A\n  BRK\n", 0x0600);
    let lower = assemble_ok("  lda $10,x\n  asl a\n  brk\n", 0x0600);
    assert_eq!(upper.bytes(), lower.bytes());
    assert_eq!(upper.bytes(), vec![0xb5, 0x10, 0x0a, 0x00]);

    let err = assemble("Loop:\n  JMP loop\n", 0x0600).unwrap_err();
    assert_eq!(err.kind, AsmErrorKind::UnknownLabel("loop".to_string()));
    assert_eq!(err.line, 2);
}

#[test]
fn data_directives_and_expressions() {
    let source = "
            .org $C000
        table:
            .word table, handler, $1234
            .byte <handler, >handler, -1, 'Z'
            .res 3
        handler:
            JMP *
        after:
            .byte after - table
    ";
    let program = assemble_ok(source, ROM_BASE);
    assert_eq!(program.entry(), 0xC000);
    assert_eq!(program.symbols.get("handler"), Some(0xC00D));
    assert_eq!(
        program.bytes(),
        vec![
            0x00, 0xC0, 0x0D, 0xC0, 0x34, 0x12, // .word
            0x0D, 0xC0, 0xFF, b'Z', // .byte
            0x00, 0x00, 0x00, // .res
            0x4C, 0x0D, 0xC0, // JMP *
            0x10,
        ]
    );
}

#[test]
fn byte_values_must_fit() {
    let err = assemble("  .byte 300\n", ROM_BASE).unwrap_err();
    assert_eq!(
        err.kind,
        AsmErrorKind::ValueOutOfRange {
            value: 300,
            bits: 8
        }
    );
    let err = assemble("  .word $10000\n", ROM_BASE).unwrap_err();
    assert_eq!(
        err.kind,
        AsmErrorKind::ValueOutOfRange {
            value: 0x10000,
            bits: 16
        }
    );
}

#[test]
fn multiple_segments_load_and_run() {
    // code in ROM, a subroutine relocated into RAM
    let out = Capture::new();
    let source = "
            JSR helper
            BRK

            .org $0300
        helper:
            LDA #'!'
            STA $D020
            RTS
    ";
    let program = assemble_ok(source, ROM_BASE);
    assert_eq!(program.segments.len(), 2);
    assert_eq!(program.segments[1].addr, 0x0300);
    assert_eq!(program.image_base(), 0x0300);

    let loader = Loader::new(Config::default());
    let outcome = loader
        .execute(&Input::Source(source.to_string()), empty(), out.clone())
        .unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(out.text(), "!");
}
